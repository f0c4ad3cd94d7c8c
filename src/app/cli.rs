//! Command-line interface.

use super::clone_plan::{CloneOverrides, CommandScope};
use super::cloner::CloneRequest;
use super::config::ClonerConfig;
use super::credentials::ClientSettings;
use super::waiter::{WaitPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};
use anyhow::Result;
use clap::{ArgAction, Args, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "lambda-cloner",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("LAMBDA_CLONER_GIT_REVISION"), ")"),
    about = "Clone an AWS Lambda function's code and configuration under a new name",
    long_about = "Reads the source function's descriptor, downloads its code package and\n\
                  creates (or, after confirmation, updates) the target function with the\n\
                  same settings. Every document exchanged with Lambda is kept in a\n\
                  timestamped working directory."
)]
pub struct Cli {
    /// Function to copy from
    pub source_function: String,

    /// Function to create or overwrite
    pub new_function: String,

    /// AWS region (defaults to the profile/environment region)
    pub region: Option<String>,

    /// Named AWS profile to use for credentials
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Custom Lambda endpoint, e.g. http://localhost:4566
    #[arg(long, value_name = "URL")]
    pub endpoint_url: Option<String>,

    /// Directory in which the timestamped working directory is created
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Defaults file (otherwise ./lambda-cloner.json if present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Overwrite an existing target without asking
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Print the equivalent `aws lambda` commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Do not copy the source function's tags to a newly created target
    #[arg(long)]
    pub no_tags: bool,

    /// Seconds between state polls while waiting for the target to settle
    #[arg(long, value_name = "SECONDS")]
    pub wait_interval_secs: Option<u64>,

    /// Maximum number of state polls per wait
    #[arg(long, value_name = "N")]
    pub wait_max_attempts: Option<u32>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Settings to change on the copy.
#[derive(Args, Debug, Default, Clone)]
pub struct OverrideArgs {
    /// Runtime identifier, e.g. python3.12
    #[arg(long)]
    pub runtime: Option<String>,

    /// Memory size in MB
    #[arg(long, value_name = "MB")]
    pub memory: Option<i32>,

    /// Timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<i32>,

    /// Ephemeral /tmp storage in MB
    #[arg(long, value_name = "MB")]
    pub ephemeral_storage: Option<i32>,

    /// Instruction set architecture
    #[arg(long, value_parser = ["x86_64", "arm64"])]
    pub architecture: Option<String>,

    /// Function description
    #[arg(long)]
    pub description: Option<String>,

    /// Set an environment variable on the copy (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Drop the source's environment variables
    #[arg(long)]
    pub clear_env: bool,

    /// Layer version ARN, replaces the source layers (repeatable)
    #[arg(long = "layer", value_name = "ARN")]
    pub layers: Vec<String>,

    /// Attach no layers to the copy
    #[arg(long, conflicts_with = "layers")]
    pub no_layers: bool,

    /// Subnet for the VPC placement (repeatable)
    #[arg(long = "subnet-id", value_name = "ID")]
    pub subnet_ids: Vec<String>,

    /// Security group for the VPC placement (repeatable)
    #[arg(long = "security-group-id", value_name = "ID")]
    pub security_group_ids: Vec<String>,

    /// Do not attach the copy to a VPC
    #[arg(long, conflicts_with_all = ["subnet_ids", "security_group_ids"])]
    pub no_vpc: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

impl OverrideArgs {
    pub fn to_overrides(&self) -> CloneOverrides {
        CloneOverrides {
            runtime: self.runtime.clone(),
            memory_size: self.memory,
            timeout: self.timeout,
            ephemeral_storage: self.ephemeral_storage,
            architecture: self.architecture.clone(),
            description: self.description.clone(),
            environment: self.env.iter().cloned().collect(),
            clear_environment: self.clear_env,
            layers: self.layers.clone(),
            clear_layers: self.no_layers,
            subnet_ids: self.subnet_ids.clone(),
            security_group_ids: self.security_group_ids.clone(),
            detach_vpc: self.no_vpc,
        }
    }
}

impl Cli {
    /// `--config` if given, else `./lambda-cloner.json` if present.
    pub fn load_config(&self) -> Result<ClonerConfig> {
        match &self.config {
            Some(path) => ClonerConfig::load_from_path(path),
            None => ClonerConfig::load_default(),
        }
    }

    pub fn client_settings(&self, config: &ClonerConfig) -> ClientSettings {
        ClientSettings {
            region: self.region.clone(),
            profile: self.profile.clone(),
            endpoint_url: self.endpoint_url.clone(),
        }
        .with_fallback(ClientSettings {
            region: config.region.clone(),
            profile: config.profile.clone(),
            endpoint_url: config.endpoint_url.clone(),
        })
    }

    pub fn wait_policy(&self, config: &ClonerConfig) -> WaitPolicy {
        let interval = self
            .wait_interval_secs
            .or(config.wait_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let max_attempts = self
            .wait_max_attempts
            .or(config.wait_max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        WaitPolicy {
            interval,
            max_attempts,
        }
    }

    pub fn clone_request(&self, config: &ClonerConfig, scope: CommandScope) -> CloneRequest {
        CloneRequest {
            source_name: self.source_function.clone(),
            target_name: self.new_function.clone(),
            overrides: self.overrides.to_overrides(),
            copy_tags: !self.no_tags && config.copy_tags.unwrap_or(true),
            dry_run: self.dry_run,
            wait_policy: self.wait_policy(config),
            work_root: self
                .work_dir
                .clone()
                .or_else(|| config.work_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            command_scope: scope,
        }
    }

    /// Default tracing filter for the stderr layer.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["lambda-cloner"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_positional_arguments() {
        let cli = parse(&["orders-api", "orders-api-copy", "eu-west-1"]);
        assert_eq!(cli.source_function, "orders-api");
        assert_eq!(cli.new_function, "orders-api-copy");
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));

        let cli = parse(&["orders-api", "orders-api-copy"]);
        assert!(cli.region.is_none());
    }

    #[test]
    fn test_missing_arguments_rejected() {
        assert!(Cli::try_parse_from(["lambda-cloner", "orders-api"]).is_err());
        assert!(Cli::try_parse_from(["lambda-cloner"]).is_err());
    }

    #[test]
    fn test_override_flags() {
        let cli = parse(&[
            "src",
            "dst",
            "--memory",
            "1024",
            "--architecture",
            "arm64",
            "--env",
            "STAGE=dev",
            "--env",
            "URL=http://x?a=b",
            "--layer",
            "arn:aws:lambda:us-east-1:1:layer:a:1",
            "--no-vpc",
        ]);
        let overrides = cli.overrides.to_overrides();
        assert_eq!(overrides.memory_size, Some(1024));
        assert_eq!(overrides.architecture.as_deref(), Some("arm64"));
        assert_eq!(
            overrides.environment.get("URL").map(String::as_str),
            Some("http://x?a=b")
        );
        assert_eq!(overrides.layers.len(), 1);
        assert!(overrides.detach_vpc);
    }

    #[test]
    fn test_invalid_flags_rejected() {
        assert!(Cli::try_parse_from(["lambda-cloner", "a", "b", "--architecture", "mips"]).is_err());
        assert!(Cli::try_parse_from(["lambda-cloner", "a", "b", "--env", "NOVALUE"]).is_err());
        assert!(Cli::try_parse_from([
            "lambda-cloner",
            "a",
            "b",
            "--no-vpc",
            "--subnet-id",
            "subnet-1"
        ])
        .is_err());
    }

    #[test]
    fn test_config_fallbacks() {
        let cli = parse(&["src", "dst", "--wait-max-attempts", "5"]);
        let config = ClonerConfig {
            region: Some("us-west-2".to_string()),
            work_dir: Some(PathBuf::from("/tmp/clones")),
            wait_interval_secs: Some(7),
            wait_max_attempts: Some(99),
            copy_tags: Some(false),
            ..Default::default()
        };

        let settings = cli.client_settings(&config);
        assert_eq!(settings.region.as_deref(), Some("us-west-2"));

        let request = cli.clone_request(&config, CommandScope::default());
        assert_eq!(request.wait_policy.max_attempts, 5);
        assert_eq!(request.wait_policy.interval, Duration::from_secs(7));
        assert_eq!(request.work_root, PathBuf::from("/tmp/clones"));
        assert!(!request.copy_tags);
    }

    #[test]
    fn test_log_level() {
        assert_eq!(parse(&["a", "b"]).log_level(), "info");
        assert_eq!(parse(&["a", "b", "-vv"]).log_level(), "trace");
    }
}
