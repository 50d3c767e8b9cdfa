use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use sable_chain::parameters::Network;

/// Configuration for the state service.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The root directory for storing cached data.
    ///
    /// Each network gets its own subdirectory, so one cache directory can
    /// serve several networks.
    pub cache_dir: PathBuf,

    /// Whether to use an ephemeral database.
    ///
    /// Ephemeral databases are stored in memory on Linux, and in a
    /// temporary directory on other OSes. Set this to `true` in tests.
    pub ephemeral: bool,

    /// Whether to delete old block and undo records once they fall behind
    /// the keep window. Entries, coins, and pointers are never pruned.
    pub prune: bool,
}

impl Config {
    pub(crate) fn sled_config(&self, network: Network) -> sled::Config {
        let config = sled::Config::default();
        if self.ephemeral {
            config.temporary(true)
        } else {
            let path = self.cache_dir.join("state").join(network.to_string());
            config.path(path)
        }
    }

    /// A config for tests: ephemeral storage, no pruning.
    pub fn ephemeral() -> Config {
        Config {
            ephemeral: true,
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("sable");

        Self {
            cache_dir,
            ephemeral: false,
            prune: false,
        }
    }
}
