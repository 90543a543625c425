//! SIEVE - Filter Module
//! The membership contract, its two backends and the facade that
//! selects between them.

pub mod bitmap;
pub mod bloom;
pub mod concurrent;
pub mod local;
pub mod metrics;
pub mod shared;

use crate::config::{BackendConfig, FilterConfig, FilterParams};
use crate::error::{Result, SieveError};
use crate::types::{BackendKind, FilterIdentity};

use self::local::LocalFilter;
use self::metrics::FilterMetrics;
use self::shared::SharedFilter;

/// Approximate-set contract shared by every backend.
///
/// ## Polarity
/// `add` and `add_all` return **`true` when the item was already present**
/// before the call. A `false` means the item is new and should be processed.
///
/// ## Guarantees
/// - No false negatives: an item whose add succeeded always tests present.
/// - False positives at most `error_rate` while under `capacity`; beyond
///   capacity the rate degrades.
/// - Adding an item twice is a no-op the second time, so retries are safe.
pub trait MembershipFilter {
    /// Insert one item.
    fn add(&mut self, item: &[u8]) -> Result<bool>;

    /// Insert every item in order, one flag per item. Later duplicates in
    /// the batch see earlier ones. On error no flags are returned.
    fn add_all<I>(&mut self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>;

    /// Test one item.
    fn contains(&self, item: &[u8]) -> Result<bool>;

    /// Test every item, one flag per item in input order.
    fn contains_all<I>(&self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>;

    /// Save state to durable storage. Overwrites any previous image.
    fn persist(&mut self) -> Result<()>;

    /// Replace in-memory state with the last persisted image.
    fn restore(&mut self) -> Result<()>;
}

enum Backend {
    Local(LocalFilter),
    Shared(SharedFilter),
}

/// A filter bound to one identity, with its backend fixed at construction.
///
/// ## Example
/// ```no_run
/// use sieve::config::FilterConfig;
/// use sieve::filter::{MembershipFilter, Sieve};
/// use sieve::types::FilterIdentity;
///
/// let config = FilterConfig::new(FilterIdentity::new("news").unwrap()).local("/tmp/sieve");
/// let mut filter = Sieve::open(&config).unwrap();
///
/// assert!(!filter.add(b"https://example.com/").unwrap());
/// assert!(filter.add(b"https://example.com/").unwrap());
/// filter.close(true).unwrap();
/// ```
pub struct Sieve {
    backend: Backend,
    metrics: FilterMetrics,
}

impl Sieve {
    /// Open the backend selected by `config`. Fails fast on invalid
    /// parameters, identity or connection settings.
    pub fn open(config: &FilterConfig) -> Result<Self> {
        let identity = config.identity.clone();
        let backend = match &config.backend {
            BackendConfig::Local { store_dir } => {
                Backend::Local(LocalFilter::open(identity, config.params, store_dir)?)
            }
            BackendConfig::Shared(remote) => {
                Backend::Shared(SharedFilter::connect(identity, config.params, remote)?)
            }
        };

        let sieve = Self {
            backend,
            metrics: FilterMetrics::new(),
        };
        log::info!(
            "filter '{}' opened on {} backend (capacity {}, error rate {})",
            sieve.identity(),
            sieve.kind(),
            config.params.capacity,
            config.params.error_rate
        );
        Ok(sieve)
    }

    pub fn identity(&self) -> &FilterIdentity {
        match &self.backend {
            Backend::Local(f) => f.identity(),
            Backend::Shared(f) => f.identity(),
        }
    }

    pub fn params(&self) -> &FilterParams {
        match &self.backend {
            Backend::Local(f) => f.params(),
            Backend::Shared(f) => f.params(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match &self.backend {
            Backend::Local(_) => BackendKind::Local,
            Backend::Shared(_) => BackendKind::Shared,
        }
    }

    pub fn metrics(&self) -> &FilterMetrics {
        &self.metrics
    }

    /// Load the saved image when there is one. Returns `false` if the
    /// local image does not exist yet; any other failure is an error.
    pub fn restore_if_present(&mut self) -> Result<bool> {
        let result = match &mut self.backend {
            Backend::Local(f) => f.restore(),
            Backend::Shared(f) => f.restore(),
        };
        match result {
            Ok(()) => {
                self.metrics.record_restore();
                Ok(true)
            }
            Err(SieveError::NotFound(path)) => {
                log::debug!("no saved image at {:?}; starting empty", path);
                Ok(false)
            }
            Err(e) => self.track(Err(e)),
        }
    }

    /// Release the filter, persisting first when `flush` is set.
    /// Flushing a shared filter does nothing.
    pub fn close(mut self, flush: bool) -> Result<()> {
        if flush {
            self.persist()?;
        }
        log::debug!("filter '{}' closed", self.identity());
        Ok(())
    }

    /// Count failures; the backend result passes through unchanged.
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.metrics.record_failure();
        }
        result
    }
}

impl From<LocalFilter> for Sieve {
    fn from(filter: LocalFilter) -> Self {
        Self {
            backend: Backend::Local(filter),
            metrics: FilterMetrics::new(),
        }
    }
}

impl From<SharedFilter> for Sieve {
    fn from(filter: SharedFilter) -> Self {
        Self {
            backend: Backend::Shared(filter),
            metrics: FilterMetrics::new(),
        }
    }
}

impl MembershipFilter for Sieve {
    fn add(&mut self, item: &[u8]) -> Result<bool> {
        let result = match &mut self.backend {
            Backend::Local(f) => f.add(item),
            Backend::Shared(f) => f.add(item),
        };
        let present = self.track(result)?;
        self.metrics.record_adds(&[present]);
        Ok(present)
    }

    fn add_all<I>(&mut self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let result = match &mut self.backend {
            Backend::Local(f) => f.add_all(items),
            Backend::Shared(f) => f.add_all(items),
        };
        let flags = self.track(result)?;
        self.metrics.record_adds(&flags);
        Ok(flags)
    }

    fn contains(&self, item: &[u8]) -> Result<bool> {
        let result = match &self.backend {
            Backend::Local(f) => f.contains(item),
            Backend::Shared(f) => f.contains(item),
        };
        let found = self.track(result)?;
        self.metrics.record_lookups(&[found]);
        Ok(found)
    }

    fn contains_all<I>(&self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let result = match &self.backend {
            Backend::Local(f) => f.contains_all(items),
            Backend::Shared(f) => f.contains_all(items),
        };
        let found = self.track(result)?;
        self.metrics.record_lookups(&found);
        Ok(found)
    }

    fn persist(&mut self) -> Result<()> {
        let result = match &mut self.backend {
            Backend::Local(f) => f.persist(),
            Backend::Shared(f) => f.persist(),
        };
        self.track(result)?;
        self.metrics.record_persist();
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        let result = match &mut self.backend {
            Backend::Local(f) => f.restore(),
            Backend::Shared(f) => f.restore(),
        };
        self.track(result)?;
        self.metrics.record_restore();
        Ok(())
    }
}
