//! Terraform state file model and resource instance addressing.

pub mod address;
mod error;
pub mod state;

pub use address::{InstanceKey, ModuleInstance, ResourceAddr, ResourceInstanceAddr, ResourceMode};
pub use error::StateError;
pub use state::{InstanceObject, ResourceInstance, State, read_state_file};
