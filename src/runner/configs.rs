use clock_servo::clock::SimConfig;
use config::ConfigError;
use serde::{Deserialize, Serialize};

/// Where the runner writes its results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_samples_filepath")]
    pub samples_filepath: String,
    #[serde(default)]
    pub summary_filepath: Option<String>,
}

impl OutputConfig {
    fn default_samples_filepath() -> String {
        "samples.csv".to_string()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            samples_filepath: Self::default_samples_filepath(),
            summary_filepath: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunnerConfig {
    pub simulation: SimConfig,
    pub output: OutputConfig,
}

impl RunnerConfig {
    /// Load from the file named by `CONFIG_FILE`: a `[simulation]` section
    /// (or a flat simulation config) plus an optional `[output]` section.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG_FILE")
            .map_err(|_| ConfigError::Message("CONFIG_FILE environment variable not set".into()))?;
        let source = SimConfig::source(&path)?;
        let simulation = SimConfig::from_file(&path)?;
        let output = match source.get("output") {
            Ok(output) => output,
            Err(ConfigError::NotFound(_)) => OutputConfig::default(),
            Err(err) => return Err(err),
        };
        Ok(Self { simulation, output })
    }
}
