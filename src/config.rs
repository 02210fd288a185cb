//! Client configuration.
//!
//! All tunables are loaded once at process start from a TOML file (or built
//! from [`Default`]s) and are immutable afterwards: engine binary candidates,
//! the optional remote engine host, the throttle-script path, the run
//! concurrency bound, the per-operation timeout table, and the bandwidth
//! limit bounds.

use crate::types::LimitBounds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-operation timeout table, in seconds.
///
/// Every engine invocation is bound to exactly one entry of this table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationTimeouts {
    /// `run` (container create)
    pub run_secs: u64,
    /// `rm` (container removal)
    pub rm_secs: u64,
    /// `pull`
    pub pull_secs: u64,
    /// `ps` (listing)
    pub ps_secs: u64,
    /// `pause`
    pub pause_secs: u64,
    /// `unpause`
    pub unpause_secs: u64,
    /// client version query at startup
    pub version_secs: u64,
    /// `inspect` queries (address, networks, OOM flag)
    pub inspect_secs: u64,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            run_secs: 60,
            rm_secs: 60,
            pull_secs: 600,
            ps_secs: 60,
            pause_secs: 10,
            unpause_secs: 10,
            version_secs: 10,
            inspect_secs: 30,
        }
    }
}

impl OperationTimeouts {
    /// Timeout for container creation.
    pub fn run(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }

    /// Timeout for container removal.
    pub fn rm(&self) -> Duration {
        Duration::from_secs(self.rm_secs)
    }

    /// Timeout for image pulls.
    pub fn pull(&self) -> Duration {
        Duration::from_secs(self.pull_secs)
    }

    /// Timeout for container listing.
    pub fn ps(&self) -> Duration {
        Duration::from_secs(self.ps_secs)
    }

    /// Timeout for pausing a container.
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    /// Timeout for unpausing a container.
    pub fn unpause(&self) -> Duration {
        Duration::from_secs(self.unpause_secs)
    }

    /// Timeout for the startup version query.
    pub fn version(&self) -> Duration {
        Duration::from_secs(self.version_secs)
    }

    /// Timeout for inspect queries.
    pub fn inspect(&self) -> Duration {
        Duration::from_secs(self.inspect_secs)
    }
}

/// Configuration for the container runtime client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeClientConfig {
    /// Candidate paths for the engine binary, tried in order; the first
    /// executable entry wins. PATH lookup is the final fallback.
    pub binary_candidates: Vec<PathBuf>,
    /// Remote engine host; when set, every invocation carries
    /// `--host tcp://<host>`.
    pub engine_host: Option<String>,
    /// Path to the traffic-shaping script that provisions throttled
    /// networks.
    pub throttle_script: PathBuf,
    /// Upper bound on concurrent container creations; zero or below
    /// disables the bound.
    pub max_parallel_runs: i32,
    /// Per-operation timeouts.
    pub timeouts: OperationTimeouts,
    /// Bounds for bandwidth/network limit values.
    pub limits: LimitBounds,
}

impl Default for RuntimeClientConfig {
    fn default() -> Self {
        Self {
            binary_candidates: vec![
                PathBuf::from("/usr/bin/docker"),
                PathBuf::from("/usr/local/bin/docker"),
            ],
            engine_host: None,
            throttle_script: PathBuf::from("/usr/local/bin/create-throttled-network.sh"),
            max_parallel_runs: 10,
            timeouts: OperationTimeouts::default(),
            limits: LimitBounds::default(),
        }
    }
}

impl RuntimeClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: RuntimeClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
