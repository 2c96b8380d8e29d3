use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, ConfigError};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Per-section DER efficacy for platform co-simulations",
    long_about = "Subscribes to a simulation's measurement stream, sums load and DER real power per switch area, and writes efficacy, load, and DER logs while publishing each timestep on the application output topic.\n\nEnvironment:\n  GRIDAPPSD_ADDRESS         Broker host\n  GRIDAPPSD_PORT            Broker STOMP port\n  GRIDAPPSD_USER            Broker login\n  GRIDAPPSD_PASSWORD        Broker passcode\n  GRIDAPPSD_APPLICATION_ID  Application id\n"
)]
pub struct Cli {
    #[arg(long, value_name = "PATH", conflicts_with = "preset", help = "Load configuration from a TOML file")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "NAME", help = "Use a built-in model preset (maple10, ieee13, ieee123)")]
    pub preset: Option<String>,

    #[arg(long, env = "GRIDAPPSD_ADDRESS", help = "Broker host")]
    pub host: Option<String>,

    #[arg(long, env = "GRIDAPPSD_PORT", help = "Broker STOMP port")]
    pub port: Option<u16>,

    #[arg(long, env = "GRIDAPPSD_USER", help = "Broker login")]
    pub username: Option<String>,

    #[arg(long, env = "GRIDAPPSD_PASSWORD", hide_env_values = true, help = "Broker passcode")]
    pub password: Option<String>,

    #[arg(long, env = "GRIDAPPSD_APPLICATION_ID", help = "Application id used in the output topic")]
    pub application_id: Option<String>,

    #[arg(long, value_name = "MRID", help = "Feeder model mRID")]
    pub model_mrid: Option<String>,

    #[arg(long, value_name = "PATH", help = "Read the feeder model from a JSON snapshot instead of querying")]
    pub model_snapshot: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Write the loaded feeder model to a JSON snapshot")]
    pub save_model: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        conflicts_with = "simulation_id",
        help = "Simulation run configuration (JSON) used to start a new run"
    )]
    pub run_config: Option<PathBuf>,

    #[arg(long, value_name = "ID", help = "Attach to an already running simulation")]
    pub simulation_id: Option<String>,

    #[arg(short, long, value_name = "DIR", help = "Directory for the CSV logs")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, default_value = "info", value_name = "LEVEL", help = "Default log level when RUST_LOG is unset")]
    pub log_level: String,

    #[cfg(feature = "api")]
    #[arg(long, default_value_t = false, help = "Serve the report history over HTTP while running")]
    pub serve: bool,

    #[cfg(feature = "api")]
    #[arg(long, default_value_t = 3000, value_name = "PORT", help = "API server port")]
    pub api_port: u16,
}

impl Cli {
    /// Loads the base configuration and applies command-line overrides.
    ///
    /// `--config` takes priority, then `--preset`, then the maple 10-bus demo.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        let mut config = if let Some(path) = &self.config {
            AppConfig::from_toml_file(path)?
        } else if let Some(name) = &self.preset {
            AppConfig::from_preset(name)?
        } else {
            AppConfig::demo()
        };
        self.apply(&mut config);
        Ok(config)
    }

    /// Overrides configuration fields given on the command line or in the environment.
    pub fn apply(&self, config: &mut AppConfig) {
        let g = &mut config.gridappsd;
        if let Some(host) = &self.host {
            g.host = host.clone();
        }
        if let Some(port) = self.port {
            g.port = port;
        }
        if let Some(username) = &self.username {
            g.username = username.clone();
        }
        if let Some(password) = &self.password {
            g.password = password.clone();
        }
        if let Some(id) = &self.application_id {
            g.application_id = id.clone();
        }

        if let Some(mrid) = &self.model_mrid {
            config.model.mrid = mrid.clone();
        }
        if let Some(path) = &self.model_snapshot {
            config.model.snapshot = Some(path.clone());
        }

        if let Some(id) = &self.simulation_id {
            config.simulation.simulation_id = Some(id.clone());
            config.simulation.run_config = None;
        }
        if let Some(path) = &self.run_config {
            config.simulation.run_config = Some(path.clone());
            config.simulation.simulation_id = None;
        }

        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
    }
}
