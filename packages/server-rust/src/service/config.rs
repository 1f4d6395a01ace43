use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alpaca_sim_core::{ConfigError, SimulatorConfig};
use arc_swap::ArcSwap;

/// Current device catalogue and simulator settings, swapped whole on reload.
pub type SharedCatalogue = Arc<ArcSwap<SimulatorConfig>>;

/// Synthesis timeout used when neither the command line nor the document sets one.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Image cache capacity used when the document does not set one.
pub const DEFAULT_IMAGE_CACHE_CAPACITY: usize = 32;

/// Server-level configuration for device operations and the exposure engine.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Overrides the document's `gaia_query_timeout` when set.
    pub synthesis_timeout: Option<Duration>,
    /// Number of progress steps an exposure is divided into.
    pub exposure_steps: u32,
    /// Simulated sensor readout time after integration ends.
    pub readout_delay: Duration,
    /// Overrides the document's `image_cache_capacity` when set.
    pub image_cache_capacity: Option<usize>,
    /// Reported by the management description endpoint.
    pub server_name: String,
    pub manufacturer: String,
    pub location: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            synthesis_timeout: None,
            exposure_steps: 10,
            readout_delay: Duration::from_millis(10),
            image_cache_capacity: None,
            server_name: "Alpaca Observatory Simulator".to_string(),
            manufacturer: "Alpaca Sim".to_string(),
            location: "Simulated Observatory".to_string(),
        }
    }
}

/// Where the device catalogue is read from, initially and on every reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// The document compiled into the binary.
    Builtin,
    /// A YAML file on disk, re-read on reload.
    File(PathBuf),
}

impl ConfigSource {
    /// Reads and parses the catalogue.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(&self) -> Result<SimulatorConfig, ConfigError> {
        match self {
            Self::Builtin => SimulatorConfig::builtin(),
            Self::File(path) => SimulatorConfig::from_path(path),
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtin => f.write_str("<builtin>"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}
