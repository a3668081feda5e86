//! Kiln Builder
//!
//! Container-runtime integration for Kiln:
//! - Supervising the build subprocess and streaming its output
//! - Constructing the repo2docker command line for a build target
//! - Querying the runtime for images and containers built by this service

pub mod docker;
pub mod error;
pub mod process;
pub mod repo2docker;

pub use docker::DockerClient;
pub use error::RuntimeError;
pub use process::{ExitOutcome, ProcessEvent, ProcessHandle, spawn_supervised};
