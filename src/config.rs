use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "gradebox", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let file = std::fs::File::open(&self.config_path)
            .with_context(|| format!("opening config file {}", self.config_path))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("parsing config file {}", self.config_path))
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    pub problems: Vec<ProblemConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

/// Engine tuning knobs. Every field has a default so `"engine": {}` (or no
/// engine section at all) is a valid configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct EngineSettings {
    /// Bounded worker slots for concurrent test case execution.
    #[serde(default = "default_worker_slots")]
    pub worker_slots: usize,
    /// Per-test-case wall clock budget unless the language overrides it.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Whole-submission deadline, independent of per-case timeouts.
    #[serde(default = "default_submission_timeout_ms")]
    pub submission_timeout_ms: u64,
    /// Cap on captured stdout/stderr bytes per process.
    #[serde(default = "default_output_cap_bytes")]
    pub output_cap_bytes: usize,
    /// Root for per-execution scratch directories; system temp when unset.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,
}

fn default_worker_slots() -> usize {
    4
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_submission_timeout_ms() -> u64 {
    60_000
}

fn default_output_cap_bytes() -> usize {
    64 * 1024
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_slots: default_worker_slots(),
            default_timeout_ms: default_timeout_ms(),
            submission_timeout_ms: default_submission_timeout_ms(),
            output_cap_bytes: default_output_cap_bytes(),
            scratch_root: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProblemConfig {
    pub id: u32,
    pub name: String,
    pub cases: Vec<CaseConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CaseConfig {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub hidden: bool,
}
