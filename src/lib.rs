//! SIEVE - Probabilistic De-duplication Filter
//!
//! Bloom filters that tell a crawling pipeline whether an item (URL,
//! task id) was already seen, behind one contract with two backends.
//!
//! ## Features
//! - **Local backend**: in-process bit vector with explicit persist/restore to
//!   `{store_dir}/{identity}`, CRC32-checked image
//! - **Shared backend**: bitmap in Redis keyed by identity, shared by every
//!   worker that opens the same identity (feature `redis`, on by default)
//! - **One polarity**: `add` returns `true` when the item was already present
//! - **Stable hashing**: XXH3 double hashing, identical across processes
//! - **Metrics**: lock-free counters per filter
//! - **Concurrency**: `SyncSieve`, an Arc + RwLock handle for threads
//!
//! ## Example
//! ```no_run
//! use sieve::config::FilterConfig;
//! use sieve::filter::{MembershipFilter, Sieve};
//! use sieve::types::FilterIdentity;
//!
//! let config = FilterConfig::new(FilterIdentity::new("news").unwrap());
//! let mut filter = Sieve::open(&config).unwrap();
//!
//! if !filter.add(b"https://example.com/a").unwrap() {
//!     // first sighting, process it
//! }
//! filter.persist().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod types;

pub use config::{BackendConfig, FilterConfig, FilterParams, RemoteConfig};
pub use error::{Result, SieveError};
pub use filter::concurrent::SyncSieve;
pub use filter::{MembershipFilter, Sieve};
pub use types::{BackendKind, FilterIdentity};
