//! SIEVE - Remote Bitmap Stores
//! The seam between a shared filter and the service hosting its bits.
//!
//! A store only knows keys and bit offsets. Hashing happens client-side,
//! so every process sharing a key must use the same filter geometry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

/// A keyed bitmap that several filters may share.
pub trait BitmapStore: Send + Sync {
    /// Set every offset to 1 and return the previous value of each, in order.
    /// Either all offsets are applied or the call fails.
    fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>>;

    /// Read the value of each offset, in order. Unset keys read as zeros.
    fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>>;

    /// Short name used in log lines.
    fn name(&self) -> &'static str;
}

/// Bitmaps held in this process.
///
/// Clones share the same maps, so several filters opened on clones
/// of one `MemoryBitmap` see each other's adds.
#[derive(Debug, Clone, Default)]
pub struct MemoryBitmap {
    maps: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys holding at least one set bit.
    pub fn key_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A panicking writer can at worst leave extra bits set.
        self.maps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BitmapStore for MemoryBitmap {
    fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>> {
        if offsets.is_empty() {
            return Ok(Vec::new());
        }
        let mut maps = self.lock();
        let bytes = maps.entry(key.to_string()).or_default();

        let mut previous = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            let byte_index = (offset / 8) as usize;
            if byte_index >= bytes.len() {
                // Grows like a Redis string does on SETBIT.
                bytes.resize(byte_index + 1, 0);
            }
            let mask = 1u8 << (offset % 8);
            previous.push(bytes[byte_index] & mask != 0);
            bytes[byte_index] |= mask;
        }
        Ok(previous)
    }

    fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>> {
        let maps = self.lock();
        let bytes = maps.get(key).map(Vec::as_slice).unwrap_or(&[]);
        Ok(offsets
            .iter()
            .map(|&offset| {
                bytes
                    .get((offset / 8) as usize)
                    .is_some_and(|byte| byte & (1u8 << (offset % 8)) != 0)
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisBitmap;

#[cfg(feature = "redis")]
mod redis_store {
    use std::sync::{Mutex, MutexGuard};

    use crate::config::RemoteConfig;
    use crate::error::{Result, SieveError};

    use super::BitmapStore;

    /// Bitmaps stored as Redis strings, one key per filter.
    ///
    /// Each call is a single MULTI/EXEC pipeline of SETBIT or GETBIT
    /// commands, so a batch is applied entirely or not at all.
    pub struct RedisBitmap {
        conn: Mutex<redis::Connection>,
        endpoint: String,
    }

    impl RedisBitmap {
        /// Connect, authenticate, select the database and PING.
        /// The configured timeout applies to connect, read and write.
        pub fn connect(remote: &RemoteConfig) -> Result<Self> {
            remote.validate()?;

            let info = redis::ConnectionInfo {
                addr: redis::ConnectionAddr::Tcp(remote.host.clone(), remote.port),
                redis: redis::RedisConnectionInfo {
                    db: remote.db,
                    password: (!remote.password.is_empty()).then(|| remote.password.clone()),
                    ..Default::default()
                },
            };
            let client = redis::Client::open(info)
                .map_err(|e| SieveError::Config(format!("invalid redis settings: {}", e)))?;

            let timeout = remote.timeout();
            let mut conn = client
                .get_connection_with_timeout(timeout)
                .map_err(rejected_settings)?;
            conn.set_read_timeout(Some(timeout))?;
            conn.set_write_timeout(Some(timeout))?;
            redis::cmd("PING")
                .query::<String>(&mut conn)
                .map_err(rejected_settings)?;

            let endpoint = format!("{}:{}/{}", remote.host, remote.port, remote.db);
            log::info!("connected to redis at {}", endpoint);

            Ok(Self {
                conn: Mutex::new(conn),
                endpoint,
            })
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }

        fn lock(&self) -> MutexGuard<'_, redis::Connection> {
            self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        fn run(&self, command: &str, key: &str, offsets: &[u64]) -> Result<Vec<bool>> {
            if offsets.is_empty() {
                return Ok(Vec::new());
            }

            let mut pipe = redis::pipe();
            pipe.atomic();
            for &offset in offsets {
                let cmd = pipe.cmd(command).arg(key).arg(offset);
                if command == "SETBIT" {
                    cmd.arg(1);
                }
            }

            let mut conn = self.lock();
            let replies: Vec<i64> = pipe.query(&mut *conn).map_err(|e| {
                log::warn!("{} on '{}' at {} failed: {}", command, key, self.endpoint, e);
                SieveError::from(e)
            })?;

            if replies.len() != offsets.len() {
                return Err(SieveError::Backend(format!(
                    "{} returned {} replies for {} offsets",
                    command,
                    replies.len(),
                    offsets.len()
                )));
            }
            Ok(replies.into_iter().map(|bit| bit != 0).collect())
        }
    }

    /// While connecting, a server rejection (bad db index, auth) is a
    /// settings problem. Network failures stay transient.
    fn rejected_settings(err: redis::RedisError) -> SieveError {
        match SieveError::from(err) {
            SieveError::Backend(msg) => SieveError::Config(msg),
            other => other,
        }
    }

    impl BitmapStore for RedisBitmap {
        fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>> {
            self.run("SETBIT", key, offsets)
        }

        fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>> {
            self.run("GETBIT", key, offsets)
        }

        fn name(&self) -> &'static str {
            "redis"
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_returns_previous_values() {
        let store = MemoryBitmap::new();
        assert_eq!(store.set_bits("k", &[1, 9, 1]).unwrap(), vec![false, false, true]);
        assert_eq!(store.set_bits("k", &[9, 10]).unwrap(), vec![true, false]);
    }

    #[test]
    fn test_get_unknown_key_reads_zero() {
        let store = MemoryBitmap::new();
        assert_eq!(store.get_bits("missing", &[0, 1_000_000]).unwrap(), vec![false, false]);
    }

    #[test]
    fn test_keys_are_isolated() {
        let store = MemoryBitmap::new();
        store.set_bits("a", &[5]).unwrap();
        assert_eq!(store.get_bits("a", &[5]).unwrap(), vec![true]);
        assert_eq!(store.get_bits("b", &[5]).unwrap(), vec![false]);
        assert_eq!(store.key_count(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryBitmap::new();
        let other = store.clone();
        store.set_bits("k", &[42]).unwrap();
        assert_eq!(other.get_bits("k", &[42]).unwrap(), vec![true]);
    }
}
