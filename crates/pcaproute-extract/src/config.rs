//! Configuration for the pcaproute extractor.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Fields that take a comma-separated list when set from the environment.
const LIST_KEYS: [&str; 3] = [
    "extract.exclude_hosts",
    "extract.name_allow",
    "extract.name_deny",
];

/// Top-level extract configuration.
///
/// Loaded from `pcaproute.toml` `[extract]` section or
/// `PCAPROUTE_EXTRACT__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    /// Path to the tcpdump binary (default: "tcpdump").
    #[serde(default = "default_tcpdump_path")]
    pub tcpdump_path: String,

    /// Directory the artifacts are written into.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Address patterns never classified or routed (e.g. `^0\.0\.0\.`).
    #[serde(default)]
    pub exclude_hosts: Vec<String>,

    /// When non-empty, only name-resolution lines matching one of these
    /// patterns are written to the hosts listing.
    #[serde(default)]
    pub name_allow: Vec<String>,

    /// Name-resolution lines matching any of these patterns are skipped.
    #[serde(default)]
    pub name_deny: Vec<String>,
}

fn default_tcpdump_path() -> String {
    "tcpdump".to_string()
}

fn default_output_dir() -> String {
    ".".to_string()
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            tcpdump_path: default_tcpdump_path(),
            output_dir: default_output_dir(),
            exclude_hosts: Vec::new(),
            name_allow: Vec::new(),
            name_deny: Vec::new(),
        }
    }
}

/// Load the `[extract]` section from `<file_prefix>.*` and the environment.
///
/// A missing file or section yields the defaults.
pub fn load(file_prefix: &str) -> Result<ExtractConfig, ConfigError> {
    let env = LIST_KEYS.iter().fold(
        Environment::with_prefix("PCAPROUTE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(","),
        |env, key| env.with_list_parse_key(key),
    );

    let cfg = Config::builder()
        .add_source(File::with_name(file_prefix).required(false))
        .add_source(env)
        .build()?;

    match cfg.get::<ExtractConfig>("extract") {
        Ok(c) => Ok(c),
        Err(ConfigError::NotFound(_)) => Ok(ExtractConfig::default()),
        Err(e) => Err(e),
    }
}
