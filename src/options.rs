//! Configuration for the paired LOF tables.

use crate::error::{LofError, Result};

/// Default size of a page in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4000;

/// Configuration supplied when building a table pair or an engine.
///
/// `min_pts` is the neighborhood size k; `page_size` and `cache_size` control
/// the record stores' access accounting. Values are validated once, before
/// any data is processed.
#[derive(Clone, Debug)]
pub struct LofOptions {
    /// Number of nearest neighbors considered for each object's LOF.
    pub min_pts: usize,
    /// Size of a page in bytes.
    pub page_size: usize,
    /// Size of each store's cache in bytes. Must be at least one page.
    pub cache_size: usize,
}

impl LofOptions {
    /// Creates options for the given neighborhood size with default paging
    /// (4000-byte pages, effectively unbounded cache).
    pub fn new(min_pts: usize) -> Self {
        Self {
            min_pts,
            page_size: DEFAULT_PAGE_SIZE,
            cache_size: usize::MAX,
        }
    }

    /// Sets the page size in bytes.
    pub fn page_size(mut self, bytes: usize) -> Self {
        self.page_size = bytes;
        self
    }

    /// Sets the cache size in bytes.
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = bytes;
        self
    }

    /// Checks that every field is usable.
    pub fn validate(&self) -> Result<()> {
        if self.min_pts == 0 {
            return Err(LofError::InvalidConfiguration(
                "min_pts must be greater than zero".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(LofError::InvalidConfiguration(
                "page_size must be greater than zero".into(),
            ));
        }
        if self.cache_size < self.page_size {
            return Err(LofError::InvalidConfiguration(
                "cache_size must hold at least one page".into(),
            ));
        }
        Ok(())
    }
}
