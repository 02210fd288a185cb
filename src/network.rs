//! Per-container throttled network provisioning.
//!
//! Before a container is created, its requested `--network` is replaced by a
//! uniquely named, rate-limited network set up by an external traffic-shaping
//! script. Provisioning failure is never fatal: the run degrades to the
//! default bridge network with no throttling applied.
//!
//! Known limitation: if provisioning succeeds but the subsequent create step
//! fails or the process crashes in between, the created network is not
//! reclaimed here. Orphan cleanup belongs to an external reconciliation
//! sweep.

use crate::process::{ProcessError, ProcessRunner};
use crate::types::TransactionId;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The platform's default, unthrottled network.
pub const DEFAULT_NETWORK: &str = "bridge";

/// Bandwidth in Mbit substituted when a network name carries no decodable
/// value.
pub const DEFAULT_BANDWIDTH_MBIT: &str = "10";

/// Outcome of network provisioning for one container.
#[derive(Debug, Clone)]
pub struct ProvisionedNetwork {
    /// The network the container will be attached to.
    pub name: String,
    /// Run arguments with `--network` rewritten accordingly.
    pub args: Vec<String>,
}

/// Derives a throttled, uniquely named network per container.
pub struct NetworkProvisioner {
    runner: Arc<dyn ProcessRunner>,
    throttle_script: PathBuf,
    timeout: Duration,
    counter: AtomicU32,
}

impl NetworkProvisioner {
    /// Create a provisioner invoking `throttle_script` under `timeout`.
    pub fn new(runner: Arc<dyn ProcessRunner>, throttle_script: PathBuf, timeout: Duration) -> Self {
        Self {
            runner,
            throttle_script,
            timeout,
            counter: AtomicU32::new(0),
        }
    }

    /// Provision a throttled network for the given run arguments.
    ///
    /// Returns the network to associate with the container and the rewritten
    /// arguments. This never fails: when the requested network is the default
    /// (or none is requested) throttling is skipped, and when the throttle
    /// script fails the arguments are rewritten to the default bridge
    /// network instead.
    pub async fn provision(&self, tid: &TransactionId, args: &[String]) -> ProvisionedNetwork {
        let Some(requested) = requested_network(args) else {
            debug!(tid = %tid, "no network requested, using {DEFAULT_NETWORK}");
            return ProvisionedNetwork {
                name: DEFAULT_NETWORK.to_string(),
                args: args.to_vec(),
            };
        };

        if requested == DEFAULT_NETWORK {
            return ProvisionedNetwork {
                name: DEFAULT_NETWORK.to_string(),
                args: args.to_vec(),
            };
        }

        let bandwidth = extract_bandwidth(args);
        let unique = self.unique_name(&requested);

        match self.throttle(&unique, &bandwidth, args).await {
            Ok(()) => {
                info!(
                    tid = %tid,
                    network = %unique,
                    bandwidth_mbit = %bandwidth,
                    "provisioned throttled network"
                );
                ProvisionedNetwork {
                    name: unique.clone(),
                    args: rewrite_network(args, &requested, &unique),
                }
            }
            Err(e) => {
                warn!(
                    tid = %tid,
                    network = %unique,
                    error = %e,
                    "network provisioning failed, falling back to {DEFAULT_NETWORK}"
                );
                ProvisionedNetwork {
                    name: DEFAULT_NETWORK.to_string(),
                    args: rewrite_network(args, &requested, DEFAULT_NETWORK),
                }
            }
        }
    }

    /// Append the wrapped counter to the requested name so containers started
    /// from the same client never share a network.
    fn unique_name(&self, requested: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) % 1000;
        format!("{requested}{n}")
    }

    async fn throttle(
        &self,
        network: &str,
        bandwidth: &str,
        raw_args: &[String],
    ) -> Result<(), ProcessError> {
        let cmd = vec![
            self.throttle_script.display().to_string(),
            network.to_string(),
            bandwidth.to_string(),
            raw_args.join(" "),
        ];
        self.runner.run(&cmd, self.timeout, None).await.map(|_| ())
    }
}

/// The value of the first `--network <name>` pair in `args`, if any.
pub(crate) fn requested_network(args: &[String]) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == "--network")
        .map(|w| w[1].clone())
}

/// Decode the bandwidth encoded in the requested network name.
///
/// Names follow the `<base>_network_<bandwidthMbit>` convention; fewer than
/// three underscore-delimited segments means the value is not decodable and
/// [`DEFAULT_BANDWIDTH_MBIT`] is substituted.
pub(crate) fn extract_bandwidth(args: &[String]) -> String {
    let Some(name) = requested_network(args) else {
        return DEFAULT_BANDWIDTH_MBIT.to_string();
    };
    let segments: Vec<&str> = name.split('_').collect();
    if segments.len() < 3 {
        DEFAULT_BANDWIDTH_MBIT.to_string()
    } else {
        segments[segments.len() - 1].to_string()
    }
}

/// Rewrite every `--network <from>` pair to `--network <to>`.
fn rewrite_network(args: &[String], from: &str, to: &str) -> Vec<String> {
    let mut out = args.to_vec();
    let mut i = 0;
    while i + 1 < out.len() {
        if out[i] == "--network" && out[i + 1] == from {
            out[i + 1] = to.to_string();
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    /// Scripted runner recording invocations and replaying canned outcomes.
    struct ScriptedRunner {
        outcome: Result<String, ProcessError>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn ok() -> Self {
            Self {
                outcome: Ok(String::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                outcome: Err(ProcessError::Unsuccessful {
                    result: crate::process::ProcessResult {
                        status: 1,
                        stdout: String::new(),
                        stderr: "tc failed".to_string(),
                    },
                    command: "throttle".to_string(),
                }),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(
            &self,
            args: &[String],
            _timeout: Duration,
            _masked_args: Option<&[String]>,
        ) -> Result<String, ProcessError> {
            self.calls.lock().unwrap().push(args.to_vec());
            self.outcome.clone()
        }
    }

    fn provisioner(runner: Arc<ScriptedRunner>) -> NetworkProvisioner {
        NetworkProvisioner::new(
            runner,
            PathBuf::from("/opt/throttle.sh"),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_extract_bandwidth_from_encoded_name() {
        assert_eq!(extract_bandwidth(&argv(&["--network", "myact_network_55"])), "55");
    }

    #[test]
    fn test_extract_bandwidth_defaults_on_short_name() {
        assert_eq!(extract_bandwidth(&argv(&["--network", "badname"])), "10");
        assert_eq!(extract_bandwidth(&argv(&["-d"])), "10");
    }

    #[tokio::test]
    async fn test_no_network_flag_skips_throttling() {
        let runner = Arc::new(ScriptedRunner::ok());
        let p = provisioner(Arc::clone(&runner));
        let tid = TransactionId::new("t0");

        let result = p.provision(&tid, &argv(&["-d", "-m", "256m"])).await;
        assert_eq!(result.name, DEFAULT_NETWORK);
        assert_eq!(result.args, argv(&["-d", "-m", "256m"]));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bridge_request_skips_throttling() {
        let runner = Arc::new(ScriptedRunner::ok());
        let p = provisioner(Arc::clone(&runner));
        let tid = TransactionId::new("t0");

        let result = p.provision(&tid, &argv(&["--network", "bridge"])).await;
        assert_eq!(result.name, DEFAULT_NETWORK);
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_success_rewrites_to_unique_name() {
        let runner = Arc::new(ScriptedRunner::ok());
        let p = provisioner(Arc::clone(&runner));
        let tid = TransactionId::new("t1");

        let result = p
            .provision(&tid, &argv(&["-d", "--network", "act_network_55"]))
            .await;

        assert_eq!(result.name, "act_network_550");
        assert_eq!(result.args, argv(&["-d", "--network", "act_network_550"]));

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        // script, unique name, bandwidth, raw argument string
        assert_eq!(calls[0][0], "/opt/throttle.sh");
        assert_eq!(calls[0][1], "act_network_550");
        assert_eq!(calls[0][2], "55");
        assert_eq!(calls[0][3], "-d --network act_network_55");
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_bridge() {
        let runner = Arc::new(ScriptedRunner::failing());
        let p = provisioner(Arc::clone(&runner));
        let tid = TransactionId::new("t2");

        let result = p.provision(&tid, &argv(&["--network", "foo"])).await;
        assert_eq!(result.name, DEFAULT_NETWORK);
        assert_eq!(result.args, argv(&["--network", "bridge"]));
    }

    #[tokio::test]
    async fn test_counter_increments_and_wraps() {
        let runner = Arc::new(ScriptedRunner::ok());
        let p = provisioner(Arc::clone(&runner));
        let tid = TransactionId::new("t3");

        let first = p.provision(&tid, &argv(&["--network", "a_network_5"])).await;
        let second = p.provision(&tid, &argv(&["--network", "a_network_5"])).await;
        assert_eq!(first.name, "a_network_50");
        assert_eq!(second.name, "a_network_51");

        p.counter.store(999, Ordering::Relaxed);
        let wrapped = p.provision(&tid, &argv(&["--network", "a_network_5"])).await;
        assert_eq!(wrapped.name, "a_network_5999");
        let after = p.provision(&tid, &argv(&["--network", "a_network_5"])).await;
        assert_eq!(after.name, "a_network_50");
    }
}
