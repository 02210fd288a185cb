//! # Action Container Runtime client
//!
//! The container-engine client used by a serverless-platform worker to
//! create, inspect, and tear down action-execution containers, giving every
//! container an isolated, rate-limited network.
//!
//! ## Architecture Overview
//!
//! The crate is organized into small, composable modules:
//!
//! - **[`client`]**: the top-level [`ContainerClient`] exposing the lifecycle
//!   operations (run, pause, unpause, rm, ps, pull, inspect)
//! - **[`process`]**: subprocess execution with timeouts and masked logging
//! - **[`network`]**: per-container throttled network provisioning with
//!   bridge fallback
//! - **[`limiter`]**: the FIFO admission gate bounding concurrent creates
//! - **[`pull`]**: concurrent image-pull deduplication
//! - **[`types`]**: validated value types (container ids, addresses,
//!   bandwidth limits)
//! - **[`config`]**: TOML-loaded client configuration
//!
//! ## Key Features
//!
//! ### 🚦 Admission control
//! - Bounded concurrent container creation (the engine fails a fraction of
//!   concurrent creates above a low threshold)
//! - FIFO fairness, scoped permits released on every exit path
//!
//! ### 🌐 Throttled networks
//! - A uniquely named, rate-limited network per container, shaped by an
//!   external traffic-shaping script
//! - Provisioning failure silently degrades to the default bridge network;
//!   it never fails a container creation
//!
//! ### 📦 Pull deduplication
//! - At most one pull command per image reference in flight; concurrent
//!   callers join and share the outcome
//!
//! ### 🔒 Typed failures
//! - Exit-code-driven classification: a failed create that still produced a
//!   container id surfaces as a broken-container error the caller must clean
//!   up after
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use acr::{ContainerClient, RuntimeClientConfig, TransactionId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), acr::ClientError> {
//!     let client = ContainerClient::new(RuntimeClientConfig::default()).await?;
//!     let tid = TransactionId::new("invocation-42");
//!
//!     client.pull(&tid, "whisk/nodejs:14").await?;
//!     let id = client
//!         .run(
//!             &tid,
//!             "whisk/nodejs:14",
//!             &["--network".to_string(), "myaction_network_55".to_string()],
//!             None,
//!         )
//!         .await?;
//!
//!     let address = client.inspect_ip_address(&tid, &id, "bridge").await?;
//!     println!("container {} at {}", id, address);
//!
//!     client.rm(&tid, &id).await?;
//!     Ok(())
//! }
//! ```

/// Top-level container runtime client.
pub mod client;

/// Client configuration loaded once at process start.
pub mod config;

/// Error taxonomy and create-failure classification.
pub mod error;

/// Admission gate for concurrent container creation.
pub mod limiter;

/// Per-container throttled network provisioning.
pub mod network;

/// Subprocess execution with timeouts.
pub mod process;

/// Concurrent image-pull deduplication.
pub mod pull;

/// Validated value types.
pub mod types;

pub use client::ContainerClient;
pub use config::{OperationTimeouts, RuntimeClientConfig};
pub use error::{ClientError, Result};
pub use limiter::{RunPermit, RunSlotLimiter};
pub use network::{DEFAULT_NETWORK, NetworkProvisioner, ProvisionedNetwork};
pub use process::{HostProcessRunner, ProcessError, ProcessResult, ProcessRunner};
pub use pull::PullCache;
pub use types::{
    BandwidthLimit, ContainerAddress, ContainerId, LimitBounds, NetworkLimit, TransactionId,
    ValidationError,
};
