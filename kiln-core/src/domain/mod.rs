//! Domain types

pub mod build;
pub mod environment;
pub mod log;
pub mod source;

pub use build::{Build, BuildStatus, ResourceLimits};
pub use environment::{EnvironmentEntry, EnvironmentKind};
pub use log::LogLine;
pub use source::RepoSource;
