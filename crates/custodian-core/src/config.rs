//! Storage and manager configuration.

use std::path::PathBuf;

/// Default sled page cache capacity (64 MiB).
pub const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

/// Default data directory.
pub const DEFAULT_DATA_PATH: &str = "./custodian_data";

/// Configuration of the sled database behind a [`Storage`](crate::store::Storage).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Enable zstd compression.
    pub compression: bool,

    /// Temporary database (deleted on drop).
    pub temporary: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATA_PATH),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            compression: false,
            temporary: false,
        }
    }
}

impl StorageConfig {
    /// Create a configuration for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::new(),
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the page cache capacity.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Enable or disable compression.
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression);

        if self.temporary {
            config.temporary(true)
        } else {
            config.path(&self.path)
        }
    }
}

/// Behaviour switches of the [`MigrationManager`](crate::migration::MigrationManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Reject migrations that diverge from already-applied siblings.
    pub validate_siblings: bool,

    /// Drop tables with `CASCADE` instead of `RESTRICT`.
    pub cascade_drop: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            validate_siblings: true,
            cascade_drop: false,
        }
    }
}

impl ManagerConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable sibling validation.
    pub fn with_sibling_validation(mut self, enabled: bool) -> Self {
        self.validate_siblings = enabled;
        self
    }

    /// Drop tables with `CASCADE`.
    pub fn with_cascade_drop(mut self, cascade: bool) -> Self {
        self.cascade_drop = cascade;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert!(config.validate_siblings);
        assert!(!config.cascade_drop);

        let storage = StorageConfig::new("/tmp/custodian").with_cache_capacity(1024);
        assert_eq!(storage.cache_capacity, 1024);
        assert!(!storage.temporary);
        assert!(StorageConfig::temporary().temporary);
    }
}
