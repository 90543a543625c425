//! SIEVE - Interactive filter shell
//! Opens one filter and reads commands from stdin.
//!
//! Usage: `sieve [identity] [--store-dir <dir> | --shared <host>[:<port>]]`

use std::io::{self, BufRead, Write};

use sieve::config::{FilterConfig, RemoteConfig};
use sieve::filter::{MembershipFilter, Sieve};
use sieve::types::{BackendKind, FilterIdentity};

fn parse_args(args: &[String]) -> Result<FilterConfig, String> {
    let mut identity = "default".to_string();
    let mut store_dir = None;
    let mut remote = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--store-dir" => {
                store_dir = Some(iter.next().ok_or("--store-dir needs a path")?.clone());
            }
            "--shared" => {
                let addr = iter.next().ok_or("--shared needs host[:port]")?;
                let remote_config = match addr.rsplit_once(':') {
                    Some((host, port)) => {
                        let port = port
                            .parse()
                            .map_err(|_| format!("invalid port in '{}'", addr))?;
                        RemoteConfig::new(host, port)
                    }
                    None => RemoteConfig::new(addr.as_str(), 6379),
                };
                remote = Some(remote_config);
            }
            other if other.starts_with("--") => return Err(format!("unknown flag '{}'", other)),
            other => identity = other.to_string(),
        }
    }

    let identity = FilterIdentity::new(identity).map_err(|e| e.to_string())?;
    let mut config = FilterConfig::new(identity);
    if let Some(dir) = store_dir {
        config = config.local(dir);
    }
    if let Some(remote) = remote {
        config = config.shared(remote);
    }
    Ok(config)
}

fn print_flags(items: &[&str], flags: &[bool], yes: &str, no: &str) {
    for (item, flag) in items.iter().zip(flags) {
        println!("  {} -> {}", item, if *flag { yes } else { no });
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("[ERROR] {}", err);
            eprintln!("usage: sieve [identity] [--store-dir <dir> | --shared <host>[:<port>]]");
            std::process::exit(2);
        }
    };

    let mut filter = match Sieve::open(&config) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("[ERROR] Failed to open filter: {}", err);
            std::process::exit(1);
        }
    };

    // Exit persists, so start from the saved image or it would be replaced.
    let restored = match filter.restore_if_present() {
        Ok(restored) => restored,
        Err(err) => {
            eprintln!("[ERROR] Failed to load saved filter state: {}", err);
            std::process::exit(1);
        }
    };

    println!();
    println!("  SIEVE filter '{}' ({} backend)", filter.identity(), filter.kind());
    if restored && filter.kind() == BackendKind::Local {
        println!("  Loaded saved state.");
    }
    println!();
    println!("  Commands:");
    println!("    add <item>...      - Add items (reports new / seen)");
    println!("    has <item>...      - Test items");
    println!("    persist            - Save filter state");
    println!("    restore            - Load saved filter state");
    println!("    info               - Show filter statistics");
    println!("    exit               - Persist (local) and quit");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("sieve> ");
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break, // EOF
            Ok(_) => {}
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        let items = &parts[1..];

        match parts[0].to_lowercase().as_str() {
            "add" | "addall" => {
                if items.is_empty() {
                    println!("  Usage: add <item>...");
                    continue;
                }
                match filter.add_all(items) {
                    Ok(flags) => print_flags(items, &flags, "seen", "new"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "has" | "contains" => {
                if items.is_empty() {
                    println!("  Usage: has <item>...");
                    continue;
                }
                match filter.contains_all(items) {
                    Ok(flags) => print_flags(items, &flags, "probably present", "absent"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "persist" | "save" => match filter.persist() {
                Ok(()) => println!("  OK"),
                Err(e) => println!("  ERROR: {}", e),
            },
            "restore" | "load" => match filter.restore() {
                Ok(()) => println!("  OK"),
                Err(e) => println!("  ERROR: {}", e),
            },
            "info" | "stats" => {
                println!("  Capacity:   {}", filter.params().capacity);
                println!("  Error rate: {}", filter.params().error_rate);
                println!("{}", filter.metrics().report());
            }
            "exit" | "quit" | "q" => break,
            _ => {
                println!("  Unknown command: '{}'. Type 'exit' to quit.", parts[0]);
            }
        }
    }

    println!("  Shutting down SIEVE...");
    if let Err(e) = filter.close(true) {
        eprintln!("[ERROR] Failed to persist filter: {}", e);
        std::process::exit(1);
    }
}
