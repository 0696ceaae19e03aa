use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::constants::{DEFAULT_MAX_CONCURRENT, FALLBACK_TIMEOUT};
use crate::domain::WorkspaceMode;
use crate::runner::basic::RunnerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("EXECUTABLE_PATH is required")]
    MissingExecutablePath,
    #[error(transparent)]
    Parse(#[from] clap::Error),
}

/// Service settings, read from the environment (flags override).
#[derive(Debug, Clone, Parser)]
#[command(name = "coderunner-web", about = "Runs submitted code through an interpreter over HTTP")]
pub struct Config {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Interpreter binary, invoked with the code file as its only argument.
    #[arg(long, env = "EXECUTABLE_PATH")]
    pub executable_path: Option<String>,

    /// Values below one fall back to the default.
    #[arg(long, env = "MAX_CONCURRENT", default_value_t = DEFAULT_MAX_CONCURRENT as i64, allow_negative_numbers = true)]
    pub max_concurrent: i64,

    /// Zero or negative values fall back to the default.
    #[arg(long, env = "TIMEOUT", default_value = "10s", value_parser = parse_timeout, allow_hyphen_values = true)]
    pub timeout: Duration,

    /// Served at `/`. Empty disables static files.
    #[arg(long, env = "STATIC_DIR", default_value = "./static")]
    pub static_dir: String,

    #[arg(long, env = "WORKSPACE_MODE", value_enum, default_value_t = WorkspaceMode::File)]
    pub workspace_mode: WorkspaceMode,

    /// Where workspaces are created. Defaults to the system temp dir.
    #[arg(long, env = "WORKSPACE_DIR")]
    pub workspace_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::try_parse()?.validated()
    }

    pub fn load_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args)?.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        match &self.executable_path {
            Some(path) if !path.is_empty() => Ok(self),
            _ => Err(ConfigError::MissingExecutablePath),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        usize::try_from(self.max_concurrent)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENT)
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            FALLBACK_TIMEOUT
        } else {
            self.timeout
        }
    }

    pub fn static_dir(&self) -> Option<&Path> {
        (!self.static_dir.is_empty()).then(|| Path::new(&self.static_dir))
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    pub fn runner_config(&self) -> RunnerConfig {
        let executable = self.executable_path.as_deref().unwrap_or_default();
        let config = RunnerConfig::new(executable, self.timeout()).with_mode(self.workspace_mode);
        match &self.workspace_dir {
            Some(dir) => config.with_workspace_root(dir),
            None => config,
        }
    }
}

/// Human-readable duration; a negative one is kept as zero so the fallback applies.
fn parse_timeout(value: &str) -> Result<Duration, humantime::DurationError> {
    match value.trim().strip_prefix('-') {
        Some(magnitude) => humantime::parse_duration(magnitude).map(|_| Duration::ZERO),
        None => humantime::parse_duration(value),
    }
}
