//! TOML-based application configuration and model presets.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level application configuration parsed from TOML.
///
/// All sections have defaults matching the maple 10-bus demo. Load from
/// TOML with [`AppConfig::from_toml_file`] or use [`AppConfig::demo`] for
/// the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Platform broker connection and application identity.
    #[serde(default)]
    pub gridappsd: GridappsdConfig,
    /// Model database endpoint.
    #[serde(default)]
    pub blazegraph: BlazegraphConfig,
    /// Feeder model selection.
    #[serde(default)]
    pub model: ModelConfig,
    /// Simulation start or attach parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// CSV and bus output parameters.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Platform broker connection and application identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridappsdConfig {
    /// Broker host name.
    pub host: String,
    /// Broker STOMP port.
    pub port: u16,
    /// Broker login.
    pub username: String,
    /// Broker passcode.
    pub password: String,
    /// Application id used in the output topic.
    pub application_id: String,
    /// Timeout for request/response exchanges (seconds).
    pub request_timeout_secs: u64,
}

impl Default for GridappsdConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 61613,
            username: "system".to_string(),
            password: "manager".to_string(),
            application_id: "demo-efficacy-app".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl GridappsdConfig {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Model database endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlazegraphConfig {
    /// SPARQL endpoint URL.
    pub url: String,
}

impl Default for BlazegraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8889/bigdata/namespace/kb/sparql".to_string(),
        }
    }
}

/// Feeder model selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Feeder mRID.
    pub mrid: String,
    /// Human-readable feeder name.
    pub name: String,
    /// Load the model from a JSON snapshot instead of the platform.
    pub snapshot: Option<PathBuf>,
    /// Fold secondary-area equipment into its parent switch area.
    pub include_secondary_areas: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            mrid: "_9E985101-27AD-4FE4-B36A-EBECC98CDFAB".to_string(),
            name: "maple 10 bus".to_string(),
            snapshot: None,
            include_secondary_areas: false,
        }
    }
}

/// Simulation start or attach parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// JSON run configuration sent to start a new simulation.
    pub run_config: Option<PathBuf>,
    /// Attach to an already running simulation instead of starting one.
    pub simulation_id: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            run_config: Some(PathBuf::from("maple_demo_sim_config.json")),
            simulation_id: None,
        }
    }
}

/// CSV and bus output parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory receiving the efficacy, load, and der CSV files.
    pub directory: PathBuf,
    /// Format row timestamps in local time (UTC otherwise).
    pub local_time: bool,
    /// Publish one efficacy message per timestep.
    pub publish: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            local_time: true,
            publish: true,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"gridappsd.port"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    /// Returns the maple 10-bus demo configuration.
    pub fn demo() -> Self {
        Self {
            gridappsd: GridappsdConfig::default(),
            blazegraph: BlazegraphConfig::default(),
            model: ModelConfig::default(),
            simulation: SimulationConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Returns the IEEE 13-node test feeder preset.
    pub fn ieee13() -> Self {
        Self {
            model: ModelConfig {
                mrid: "_49AD8E07-3BF9-A4E2-CB8F-C3722F837B62".to_string(),
                name: "ieee13nodeckt".to_string(),
                ..ModelConfig::default()
            },
            simulation: SimulationConfig {
                run_config: Some(PathBuf::from("ieee13_sim_config.json")),
                simulation_id: None,
            },
            ..Self::demo()
        }
    }

    /// Returns the IEEE 123-node test feeder preset.
    pub fn ieee123() -> Self {
        Self {
            model: ModelConfig {
                mrid: "_C1C3E687-6FFD-C753-582B-632A27E28507".to_string(),
                name: "ieee123".to_string(),
                ..ModelConfig::default()
            },
            simulation: SimulationConfig {
                run_config: Some(PathBuf::from("ieee123_sim_config.json")),
                simulation_id: None,
            },
            ..Self::demo()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["maple10", "ieee13", "ieee123"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "maple10" => Ok(Self::demo()),
            "ieee13" => Ok(Self::ieee13()),
            "ieee123" => Ok(Self::ieee123()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let g = &self.gridappsd;

        if g.host.trim().is_empty() {
            errors.push(ConfigError {
                field: "gridappsd.host".into(),
                message: "must not be empty".into(),
            });
        }
        if g.port == 0 {
            errors.push(ConfigError {
                field: "gridappsd.port".into(),
                message: "must be > 0".into(),
            });
        }
        if g.application_id.trim().is_empty() {
            errors.push(ConfigError {
                field: "gridappsd.application_id".into(),
                message: "must not be empty".into(),
            });
        }
        if g.request_timeout_secs == 0 {
            errors.push(ConfigError {
                field: "gridappsd.request_timeout_secs".into(),
                message: "must be > 0".into(),
            });
        }

        let m = &self.model;
        if m.snapshot.is_none() && m.mrid.trim().is_empty() {
            errors.push(ConfigError {
                field: "model.mrid".into(),
                message: "must be set unless model.snapshot is given".into(),
            });
        }
        if m.snapshot.is_none() && self.blazegraph.url.trim().is_empty() {
            errors.push(ConfigError {
                field: "blazegraph.url".into(),
                message: "must be set unless model.snapshot is given".into(),
            });
        }

        let s = &self.simulation;
        if s.run_config.is_none() && s.simulation_id.is_none() {
            errors.push(ConfigError {
                field: "simulation.run_config".into(),
                message: "either simulation.run_config or simulation.simulation_id is required"
                    .into(),
            });
        }
        if s.simulation_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            errors.push(ConfigError {
                field: "simulation.simulation_id".into(),
                message: "must not be empty".into(),
            });
        }

        errors
    }
}
