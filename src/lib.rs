//! tfsweeper - checks that the resources recorded in a Terraform state file
//! still exist, by asking the AWS provider plugin to import each of them.
//!
//! The state file is only read, never written.

pub mod cli;
pub mod error;
pub mod plugin;
pub mod providers;
pub mod resource;
pub mod sweep;
pub mod terraform;

pub use error::SweepError;
pub use providers::{Provider, ProviderConfig, ProviderError};
pub use resource::{ImportStatus, ResourceResult};
pub use sweep::{SweepReport, sweep};
pub use terraform::{State, StateError, read_state_file};
