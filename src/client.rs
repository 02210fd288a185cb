//! Container runtime client.
//!
//! Drives the container engine through its CLI: create, inspect, pause,
//! remove, list, and pull, composing the run slot limiter, the network
//! provisioner, and the pull cache. One instance is expected per worker
//! process.

use crate::config::{OperationTimeouts, RuntimeClientConfig};
use crate::error::{ClientError, Result, classify_create_failure};
use crate::limiter::RunSlotLimiter;
use crate::network::{DEFAULT_NETWORK, NetworkProvisioner};
use crate::process::{HostProcessRunner, ProcessRunner};
use crate::pull::PullCache;
use crate::types::{ContainerAddress, ContainerId, TransactionId, ValidationError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Client for a container engine driven through its CLI.
///
/// Construction resolves the engine binary and probes the engine with a
/// version query; both must succeed or startup fails.
pub struct ContainerClient {
    runner: Arc<dyn ProcessRunner>,
    binary: PathBuf,
    host_args: Vec<String>,
    timeouts: OperationTimeouts,
    limiter: RunSlotLimiter,
    pulls: PullCache,
    network: NetworkProvisioner,
    client_version: String,
}

impl std::fmt::Debug for ContainerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerClient")
            .field("binary", &self.binary)
            .field("host_args", &self.host_args)
            .field("client_version", &self.client_version)
            .finish_non_exhaustive()
    }
}

impl ContainerClient {
    /// Create a client executing engine commands on the host.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BinaryNotFound`] if no candidate path is
    /// executable and PATH lookup fails, or [`ClientError::VersionQuery`] if
    /// the engine does not answer a version query in time. Both are fatal
    /// startup failures and are not retried.
    pub async fn new(config: RuntimeClientConfig) -> Result<Self> {
        Self::with_runner(config, Arc::new(HostProcessRunner::new())).await
    }

    /// Create a client over a custom process runner.
    pub async fn with_runner(
        config: RuntimeClientConfig,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self> {
        let binary = resolve_binary(&config.binary_candidates)?;
        debug!(binary = %binary.display(), "resolved engine binary");

        let host_args = match &config.engine_host {
            Some(host) => vec!["--host".to_string(), format!("tcp://{host}")],
            None => Vec::new(),
        };

        let network = NetworkProvisioner::new(
            Arc::clone(&runner),
            config.throttle_script.clone(),
            config.timeouts.run(),
        );

        let mut client = Self {
            runner,
            binary,
            host_args,
            limiter: RunSlotLimiter::new(config.max_parallel_runs),
            pulls: PullCache::new(),
            network,
            timeouts: config.timeouts,
            client_version: String::new(),
        };

        client.client_version = client.query_client_version().await?;
        info!(
            binary = %client.binary.display(),
            version = %client.client_version,
            "container engine client ready"
        );

        Ok(client)
    }

    /// The engine client version captured at startup.
    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    /// Query the engine for its client version.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::VersionQuery`] on any failure.
    pub async fn query_client_version(&self) -> Result<String> {
        let cmd = self.command(&["version", "--format", "{{.Client.Version}}"]);
        self.runner
            .run(&cmd, self.timeouts.version(), None)
            .await
            .map_err(ClientError::VersionQuery)
    }

    /// Create a container from `image` with the given run arguments.
    ///
    /// Admission is bounded by the configured run slot limit. The requested
    /// `--network` is replaced by a throttled per-container network (falling
    /// back to the default bridge if provisioning fails) before the create
    /// command is issued. `masked_args` substitutes `args` in log output
    /// only.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BrokenContainer`] when the create failed but
    /// left a container behind that must still be removed; other failures
    /// propagate as [`ClientError::Process`].
    pub async fn run(
        &self,
        tid: &TransactionId,
        image: &str,
        args: &[String],
        masked_args: Option<&[String]>,
    ) -> Result<ContainerId> {
        let permit = self.limiter.acquire().await;
        let provisioned = self.network.provision(tid, args).await;

        let mut create = vec!["run".to_string(), "-d".to_string()];
        create.extend(provisioned.args.iter().cloned());
        create.push(image.to_string());
        let cmd = self.command_owned(create);

        let masked_cmd = masked_args.map(|masked| {
            let mut out = vec!["run".to_string(), "-d".to_string()];
            out.extend(mask_network(masked, &provisioned.name));
            out.push(image.to_string());
            self.command_owned(out)
        });

        debug!(tid = %tid, image, network = %provisioned.name, "creating container");
        let result = self
            .runner
            .run(&cmd, self.timeouts.run(), masked_cmd.as_deref())
            .await;
        // The slot only protects the engine's create path; free it before
        // any classification or parsing.
        drop(permit);

        let stdout = result.map_err(classify_create_failure)?;
        let id = ContainerId::parse(&stdout)?;
        info!(tid = %tid, container = %id, network = %provisioned.name, "container created");
        Ok(id)
    }

    /// The IP address of `id` on `network`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AddressNotFound`] when the engine reports no
    /// address for that network.
    pub async fn inspect_ip_address(
        &self,
        tid: &TransactionId,
        id: &ContainerId,
        network: &str,
    ) -> Result<ContainerAddress> {
        let format = format!("{{{{.NetworkSettings.Networks.{network}.IPAddress}}}}");
        let cmd = self.command(&["inspect", "--format", &format, id.as_str()]);
        let stdout = self.runner.run(&cmd, self.timeouts.inspect(), None).await?;

        match ContainerAddress::parse(&stdout) {
            Ok(address) => {
                debug!(tid = %tid, container = %id, network, address = %address, "inspected address");
                Ok(address)
            }
            Err(ValidationError::NoAddress(_)) => Err(ClientError::AddressNotFound {
                id: id.clone(),
                network: network.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Pause a running container.
    ///
    /// # Errors
    ///
    /// Fails if the engine command does not exit zero in time.
    pub async fn pause(&self, tid: &TransactionId, id: &ContainerId) -> Result<()> {
        debug!(tid = %tid, container = %id, "pausing container");
        let cmd = self.command(&["pause", id.as_str()]);
        self.runner.run(&cmd, self.timeouts.pause(), None).await?;
        Ok(())
    }

    /// Unpause a paused container.
    ///
    /// # Errors
    ///
    /// Fails if the engine command does not exit zero in time.
    pub async fn unpause(&self, tid: &TransactionId, id: &ContainerId) -> Result<()> {
        debug!(tid = %tid, container = %id, "unpausing container");
        let cmd = self.command(&["unpause", id.as_str()]);
        self.runner.run(&cmd, self.timeouts.unpause(), None).await?;
        Ok(())
    }

    /// Remove a container, and its throttled network if it had one.
    ///
    /// Network removal is best-effort: a failure there is logged and
    /// swallowed, asymmetric with creation where provisioning failure
    /// degrades to the default network.
    ///
    /// # Errors
    ///
    /// Fails only if the container removal itself fails.
    pub async fn rm(&self, tid: &TransactionId, id: &ContainerId) -> Result<()> {
        let networks = self.attached_networks(tid, id).await;

        debug!(tid = %tid, container = %id, "removing container");
        let cmd = self.command(&["rm", "-f", id.as_str()]);
        self.runner.run(&cmd, self.timeouts.rm(), None).await?;

        for network in networks.iter().filter(|n| *n != DEFAULT_NETWORK) {
            let cmd = self.command(&["network", "rm", network]);
            match self.runner.run(&cmd, self.timeouts.rm(), None).await {
                Ok(_) => info!(tid = %tid, network = %network, "removed container network"),
                Err(e) => warn!(
                    tid = %tid,
                    network = %network,
                    error = %e,
                    "failed to remove container network"
                ),
            }
        }
        Ok(())
    }

    /// Networks the container is attached to; empty when the query fails.
    async fn attached_networks(&self, tid: &TransactionId, id: &ContainerId) -> Vec<String> {
        let format = "{{range $net, $v := .NetworkSettings.Networks}}{{$net}} {{end}}";
        let cmd = self.command(&["inspect", "--format", format, id.as_str()]);
        match self.runner.run(&cmd, self.timeouts.inspect(), None).await {
            Ok(stdout) => stdout.split_whitespace().map(str::to_string).collect(),
            Err(e) => {
                warn!(tid = %tid, container = %id, error = %e, "network query failed");
                Vec::new()
            }
        }
    }

    /// List container ids matching the given `(attribute, value)` filters.
    ///
    /// `all` includes stopped containers.
    ///
    /// # Errors
    ///
    /// Fails if the listing command fails or an output line is not a
    /// container id.
    pub async fn ps(
        &self,
        tid: &TransactionId,
        filters: &[(String, String)],
        all: bool,
    ) -> Result<Vec<ContainerId>> {
        let mut args = vec![
            "ps".to_string(),
            "--quiet".to_string(),
            "--no-trunc".to_string(),
        ];
        for (attribute, value) in filters {
            args.push("--filter".to_string());
            args.push(format!("{attribute}={value}"));
        }
        if all {
            args.push("--all".to_string());
        }

        let cmd = self.command_owned(args);
        let stdout = self.runner.run(&cmd, self.timeouts.ps(), None).await?;

        let ids = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ContainerId::parse)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(tid = %tid, count = ids.len(), "listed containers");
        Ok(ids)
    }

    /// Pull `image`, deduplicating concurrent requests for the same
    /// reference.
    ///
    /// # Errors
    ///
    /// Fails with the pull command's failure; callers that joined an
    /// in-flight pull see it as [`ClientError::Pull`].
    pub async fn pull(&self, tid: &TransactionId, image: &str) -> Result<()> {
        let runner = Arc::clone(&self.runner);
        let cmd = self.command(&["pull", image]);
        let timeout = self.timeouts.pull();
        let tid = tid.clone();
        let image_owned = image.to_string();

        self.pulls
            .pull_through(image, move || async move {
                info!(tid = %tid, image = %image_owned, "pulling image");
                runner.run(&cmd, timeout, None).await?;
                Ok(())
            })
            .await
    }

    /// Whether the container was killed by the kernel OOM killer.
    ///
    /// # Errors
    ///
    /// Fails if the inspect command fails or its output is not a boolean.
    pub async fn is_oom_killed(&self, tid: &TransactionId, id: &ContainerId) -> Result<bool> {
        let cmd = self.command(&["inspect", "--format", "{{.State.OOMKilled}}", id.as_str()]);
        let stdout = self.runner.run(&cmd, self.timeouts.inspect(), None).await?;

        match stdout.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => {
                warn!(tid = %tid, container = %id, output = other, "unparseable OOM flag");
                Err(ClientError::UnexpectedOutput {
                    operation: "inspect OOMKilled",
                    output: other.to_string(),
                })
            }
        }
    }

    fn command(&self, args: &[&str]) -> Vec<String> {
        self.command_owned(args.iter().map(|s| s.to_string()).collect())
    }

    fn command_owned(&self, args: Vec<String>) -> Vec<String> {
        let mut cmd = Vec::with_capacity(1 + self.host_args.len() + args.len());
        cmd.push(self.binary.display().to_string());
        cmd.extend(self.host_args.iter().cloned());
        cmd.extend(args);
        cmd
    }
}

/// Resolve the engine binary: first executable candidate, then PATH lookup
/// of the candidate binary name.
fn resolve_binary(candidates: &[PathBuf]) -> Result<PathBuf> {
    for candidate in candidates {
        if is_executable(candidate) {
            return Ok(candidate.clone());
        }
    }

    if let Some(name) = candidates.iter().find_map(|c| c.file_name()) {
        if let Ok(found) = which::which(name) {
            return Ok(found);
        }
    }

    Err(ClientError::BinaryNotFound {
        candidates: candidates.to_vec(),
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Rewrite any `--network <value>` pair in a masked argument list so the
/// logged command matches the provisioned network.
fn mask_network(masked: &[String], network: &str) -> Vec<String> {
    let mut out = masked.to_vec();
    let mut i = 0;
    while i + 1 < out.len() {
        if out[i] == "--network" {
            out[i + 1] = network.to_string();
        }
        i += 1;
    }
    out
}
