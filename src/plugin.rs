//! Provider plugin host: process launch, go-plugin handshake and the
//! tfplugin5 gRPC client.

mod client;
pub mod cty;
mod diagnostics;
mod error;
mod grpc;
pub mod handshake;
pub mod proto;

pub use client::{LaunchOptions, PluginClient, PluginMeta};
pub use cty::{CtyType, CtyValue};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::PluginError;
pub use grpc::{GrpcProvider, ImportedResource};
pub use handshake::Handshake;
