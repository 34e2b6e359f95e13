use anyhow::{ensure, Context, Result};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Runtime parameters shared by every driver of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Budget for `init_prompt`.
    pub prompt_budget_ms: u64,
    /// Budget for compiling one request.
    pub compile_budget_ms: u64,
    /// Budget for committing one request.
    pub commit_budget_ms: u64,
    /// Most fixed requests resolved locally within one step.
    pub max_fast_forward: usize,
    /// Most branches a single fork may request.
    pub max_forks: usize,
    /// Default `max_tokens` for generation.
    pub max_gen_tokens: usize,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt_budget_ms: 1000,
            compile_budget_ms: 20,
            commit_budget_ms: 1,
            max_fast_forward: 100,
            max_forks: 16,
            max_gen_tokens: 20,
            verbose: false,
        }
    }
}

impl Config {
    /// Parse and validate a JSON config. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text).context("Could not parse controller config")?;
        verify_config(&config)?;
        Ok(config)
    }

    /// Numeric parameter by name, as exposed to programs.
    pub fn get(&self, name: &str) -> Option<i64> {
        let value = match name {
            "forks" | "max_forks" => self.max_forks as u64,
            "max_tokens" | "max_gen_tokens" => self.max_gen_tokens as u64,
            "max_fast_forward" => self.max_fast_forward as u64,
            "prompt_budget_ms" => self.prompt_budget_ms,
            "compile_budget_ms" => self.compile_budget_ms,
            "commit_budget_ms" => self.commit_budget_ms,
            "verbose" => self.verbose as u64,
            _ => return None,
        };
        i64::try_from(value).ok()
    }

    pub fn prompt_budget(&self) -> Duration {
        Duration::from_millis(self.prompt_budget_ms)
    }

    pub fn compile_budget(&self) -> Duration {
        Duration::from_millis(self.compile_budget_ms)
    }

    pub fn commit_budget(&self) -> Duration {
        Duration::from_millis(self.commit_budget_ms)
    }
}

/// Validate `config`, install logging, and return it ready to share.
pub fn bootstrap(config: Config) -> Result<Arc<Config>> {
    verify_config(&config)?;
    init_tracing(config.verbose)?;
    Ok(Arc::new(config))
}

pub fn verify_config(config: &Config) -> Result<()> {
    ensure!(config.prompt_budget_ms > 0, "prompt_budget_ms must be > 0");
    ensure!(config.compile_budget_ms > 0, "compile_budget_ms must be > 0");
    ensure!(config.commit_budget_ms > 0, "commit_budget_ms must be > 0");
    ensure!(config.max_forks > 0, "max_forks must be > 0");
    ensure!(config.max_gen_tokens > 0, "max_gen_tokens must be > 0");
    ensure!(
        config.commit_budget_ms <= config.compile_budget_ms,
        "commit_budget_ms ({}) must not exceed compile_budget_ms ({})",
        config.commit_budget_ms,
        config.compile_budget_ms
    );
    Ok(())
}

/// Install a stdout tracing subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing(verbose: bool) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .context("Could not install tracing subscriber")?;

    Ok(())
}
