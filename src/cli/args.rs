use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::providers::DEFAULT_TERRAFORM_VERSION;
use crate::providers::aws;

/// Checks that every managed resource in a Terraform state file still exists,
/// by importing it through the AWS provider plugin.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// State file to sweep
    #[arg(long, env = "TFSWEEPER_STATE", default_value = "terraform.tfstate")]
    pub state: PathBuf,

    /// Path to the AWS provider plugin binary
    #[arg(long, env = "TFSWEEPER_PLUGIN", default_value = aws::PLUGIN_PATH)]
    pub plugin: PathBuf,

    #[arg(long, default_value = aws::PLUGIN_VERSION)]
    pub plugin_version: String,

    #[arg(long, env = "TFSWEEPER_PROFILE", default_value = aws::DEFAULT_PROFILE)]
    pub profile: String,

    #[arg(long, env = "TFSWEEPER_REGION", default_value = aws::DEFAULT_REGION)]
    pub region: String,

    /// Terraform version reported to the provider
    #[arg(long, default_value = DEFAULT_TERRAFORM_VERSION)]
    pub terraform_version: String,

    /// Extra provider attribute; may be repeated
    #[arg(long = "provider-config", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub provider_config: Vec<(String, String)>,

    /// Seconds to wait for the plugin handshake
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub start_timeout: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "debug")]
    pub log_level: String,

    /// Print a summary of checked resources to stdout
    #[arg(long, value_enum)]
    pub summary: Option<SummaryFormat>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryFormat {
    Table,
    Json,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in {:?}", raw));
    }
    Ok((key.to_string(), value.to_string()))
}
