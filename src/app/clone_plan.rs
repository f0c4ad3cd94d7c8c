//! What a clone will do to the target function.
//!
//! A [`ClonePlan`] is the source settings with operator overrides applied,
//! plus the tag set to copy. Given a [`CloneAction`] it can render the
//! equivalent `aws lambda` command lines, which dry-run mode prints instead
//! of calling the API.

use super::function_descriptor::{FunctionDescriptor, FunctionSettings, PackageType, VpcPlacement};
use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const SUPPORTED_ARCHITECTURES: &[&str] = &["x86_64", "arm64"];

const MEMORY_RANGE_MB: (i32, i32) = (128, 10_240);
const TIMEOUT_RANGE_SECS: (i32, i32) = (1, 900);
const EPHEMERAL_STORAGE_RANGE_MB: (i32, i32) = (512, 10_240);

/// Operator-supplied replacements for source settings.
#[derive(Debug, Clone, Default)]
pub struct CloneOverrides {
    pub runtime: Option<String>,
    pub memory_size: Option<i32>,
    pub timeout: Option<i32>,
    pub ephemeral_storage: Option<i32>,
    pub architecture: Option<String>,
    pub description: Option<String>,
    /// Merged over the source variables.
    pub environment: BTreeMap<String, String>,
    pub clear_environment: bool,
    /// Replaces the source layer list when non-empty.
    pub layers: Vec<String>,
    pub clear_layers: bool,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub detach_vpc: bool,
}

impl CloneOverrides {
    pub fn is_empty(&self) -> bool {
        self.runtime.is_none()
            && self.memory_size.is_none()
            && self.timeout.is_none()
            && self.ephemeral_storage.is_none()
            && self.architecture.is_none()
            && self.description.is_none()
            && self.environment.is_empty()
            && !self.clear_environment
            && self.layers.is_empty()
            && !self.clear_layers
            && self.subnet_ids.is_empty()
            && self.security_group_ids.is_empty()
            && !self.detach_vpc
    }

    /// Apply the overrides to settings extracted from the source.
    pub fn apply(&self, mut settings: FunctionSettings) -> Result<FunctionSettings> {
        if let Some(runtime) = &self.runtime {
            if settings.package_type == PackageType::Image {
                bail!("--runtime cannot be used with an Image-packaged function");
            }
            settings.runtime = Some(runtime.clone());
        }

        if let Some(memory) = self.memory_size {
            check_range("memory size (MB)", memory, MEMORY_RANGE_MB)?;
            settings.memory_size = memory;
        }
        if let Some(timeout) = self.timeout {
            check_range("timeout (seconds)", timeout, TIMEOUT_RANGE_SECS)?;
            settings.timeout = timeout;
        }
        if let Some(storage) = self.ephemeral_storage {
            check_range("ephemeral storage (MB)", storage, EPHEMERAL_STORAGE_RANGE_MB)?;
            settings.ephemeral_storage = storage;
        }

        if let Some(arch) = &self.architecture {
            if !SUPPORTED_ARCHITECTURES.contains(&arch.as_str()) {
                bail!(
                    "Unsupported architecture '{}' (expected one of: {})",
                    arch,
                    SUPPORTED_ARCHITECTURES.join(", ")
                );
            }
            settings.architectures = vec![arch.clone()];
        }

        if let Some(description) = &self.description {
            settings.description = Some(description.clone());
        }

        if self.clear_environment || !self.environment.is_empty() {
            let mut variables = if self.clear_environment {
                BTreeMap::new()
            } else {
                settings.environment.take().unwrap_or_default()
            };
            variables.extend(self.environment.clone());
            settings.environment = Some(variables);
        }

        if !self.layers.is_empty() {
            settings.layers = Some(self.layers.clone());
        } else if self.clear_layers {
            settings.layers = Some(Vec::new());
        }

        if self.detach_vpc {
            if !self.subnet_ids.is_empty() || !self.security_group_ids.is_empty() {
                bail!("--no-vpc cannot be combined with --subnet-id or --security-group-id");
            }
            settings.vpc = Some(VpcPlacement::default());
        } else if !self.subnet_ids.is_empty() || !self.security_group_ids.is_empty() {
            let mut placement = settings.vpc.take().unwrap_or_default();
            if !self.subnet_ids.is_empty() {
                placement.subnet_ids = self.subnet_ids.clone();
            }
            if !self.security_group_ids.is_empty() {
                placement.security_group_ids = self.security_group_ids.clone();
            }
            if placement.subnet_ids.is_empty() {
                bail!("A VPC placement needs at least one subnet (--subnet-id)");
            }
            settings.vpc = Some(placement);
        }

        Ok(settings)
    }
}

fn check_range(what: &str, value: i32, (min, max): (i32, i32)) -> Result<()> {
    if value < min || value > max {
        bail!("Invalid {}: {} (allowed {}..={})", what, value, min, max);
    }
    Ok(())
}

/// Create or update, decided by the single existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloneAction {
    Create,
    Update,
}

impl CloneAction {
    pub fn for_target(target_exists: bool) -> Self {
        if target_exists {
            CloneAction::Update
        } else {
            CloneAction::Create
        }
    }
}

/// Code reference used when rendering command lines.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeArgument {
    ZipFile(PathBuf),
    ImageUri(String),
}

/// Region and profile flags appended to every rendered command.
#[derive(Debug, Clone, Default)]
pub struct CommandScope {
    pub region: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClonePlan {
    pub source_name: String,
    pub target_name: String,
    pub settings: FunctionSettings,
    pub tags: BTreeMap<String, String>,
}

impl ClonePlan {
    pub fn new(
        source_name: &str,
        target_name: &str,
        source: &FunctionDescriptor,
        overrides: &CloneOverrides,
        copy_tags: bool,
    ) -> Result<Self> {
        if source_name == target_name {
            bail!("Source and target function names are identical ('{}')", source_name);
        }

        let settings = overrides.apply(source.settings()?)?;
        let tags = if copy_tags {
            source.tags.clone()
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            source_name: source_name.to_string(),
            target_name: target_name.to_string(),
            settings,
            tags,
        })
    }

    /// The provider CLI calls that carry out `action`, waits included.
    pub fn commands(
        &self,
        action: CloneAction,
        code: &CodeArgument,
        scope: &CommandScope,
    ) -> Vec<CommandLine> {
        match action {
            CloneAction::Create => vec![
                self.create_function_command(code, scope),
                wait_command("function-active-v2", &self.target_name, scope),
            ],
            CloneAction::Update => vec![
                self.update_code_command(code, scope),
                wait_command("function-updated-v2", &self.target_name, scope),
                self.update_configuration_command(scope),
                wait_command("function-updated-v2", &self.target_name, scope),
            ],
        }
    }

    fn create_function_command(&self, code: &CodeArgument, scope: &CommandScope) -> CommandLine {
        let s = &self.settings;
        let mut cmd = CommandLine::lambda("create-function");
        cmd.arg("--function-name", &self.target_name);
        if s.package_type == PackageType::Image {
            cmd.arg("--package-type", "Image");
        }
        match code {
            CodeArgument::ZipFile(path) => {
                cmd.arg("--zip-file", format!("fileb://{}", path.display()))
            }
            CodeArgument::ImageUri(uri) => cmd.arg("--code", format!("ImageUri={}", uri)),
        };
        cmd.arg("--role", &s.role);
        push_configuration_args(&mut cmd, s);
        cmd.args("--architectures", &s.architectures);
        if !self.tags.is_empty() {
            cmd.arg("--tags", json_arg(&self.tags));
        }
        cmd.scoped(scope);
        cmd
    }

    fn update_code_command(&self, code: &CodeArgument, scope: &CommandScope) -> CommandLine {
        let mut cmd = CommandLine::lambda("update-function-code");
        cmd.arg("--function-name", &self.target_name);
        match code {
            CodeArgument::ZipFile(path) => {
                cmd.arg("--zip-file", format!("fileb://{}", path.display()))
            }
            CodeArgument::ImageUri(uri) => cmd.arg("--image-uri", uri),
        };
        cmd.args("--architectures", &self.settings.architectures);
        cmd.scoped(scope);
        cmd
    }

    fn update_configuration_command(&self, scope: &CommandScope) -> CommandLine {
        let settings = self.settings.with_explicit_clears();
        let mut cmd = CommandLine::lambda("update-function-configuration");
        cmd.arg("--function-name", &self.target_name);
        cmd.arg("--role", &settings.role);
        push_configuration_args(&mut cmd, &settings);
        cmd.scoped(scope);
        cmd
    }
}

/// Arguments shared by create-function and update-function-configuration.
fn push_configuration_args(cmd: &mut CommandLine, s: &FunctionSettings) {
    if let Some(runtime) = &s.runtime {
        cmd.arg("--runtime", runtime);
    }
    if let Some(handler) = &s.handler {
        cmd.arg("--handler", handler);
    }
    if let Some(description) = &s.description {
        cmd.arg("--description", description);
    }
    cmd.arg("--timeout", s.timeout.to_string());
    cmd.arg("--memory-size", s.memory_size.to_string());
    cmd.arg("--ephemeral-storage", format!("Size={}", s.ephemeral_storage));
    if let Some(layers) = &s.layers {
        if layers.is_empty() {
            cmd.arg("--layers", "[]");
        } else {
            cmd.args("--layers", layers);
        }
    }
    if let Some(variables) = &s.environment {
        let env = serde_json::json!({ "Variables": variables });
        cmd.arg("--environment", env.to_string());
    }
    if let Some(vpc) = &s.vpc {
        let placement = serde_json::json!({
            "SubnetIds": vpc.subnet_ids,
            "SecurityGroupIds": vpc.security_group_ids,
        });
        cmd.arg("--vpc-config", placement.to_string());
    }
    if let Some(mode) = &s.tracing_mode {
        cmd.arg("--tracing-config", format!("Mode={}", mode));
    }
    if let Some(target) = &s.dead_letter_target_arn {
        cmd.arg("--dead-letter-config", format!("TargetArn={}", target));
    }
    if let Some(key) = &s.kms_key_arn {
        cmd.arg("--kms-key-arn", key);
    }
    if let Some(image_config) = &s.image_config {
        cmd.arg("--image-config", json_arg(image_config));
    }
}

fn wait_command(waiter: &str, function_name: &str, scope: &CommandScope) -> CommandLine {
    let mut cmd = CommandLine::new(&["aws", "lambda", "wait", waiter]);
    cmd.arg("--function-name", function_name);
    cmd.scoped(scope);
    cmd
}

fn json_arg<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// A provider CLI invocation rendered for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub args: Vec<String>,
}

impl CommandLine {
    fn new(words: &[&str]) -> Self {
        Self {
            args: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    fn lambda(operation: &str) -> Self {
        Self::new(&["aws", "lambda", operation])
    }

    fn arg(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.args.push(flag.to_string());
        self.args.push(value.into());
        self
    }

    /// A flag followed by one argv word per value.
    fn args(&mut self, flag: &str, values: &[String]) -> &mut Self {
        self.args.push(flag.to_string());
        self.args.extend(values.iter().cloned());
        self
    }

    fn scoped(&mut self, scope: &CommandScope) {
        if let Some(region) = &scope.region {
            self.arg("--region", region);
        }
        if let Some(profile) = &scope.profile {
            self.arg("--profile", profile);
        }
    }

    pub fn operation(&self) -> &str {
        self.args.get(2).map(String::as_str).unwrap_or_default()
    }

    /// Every word following `flag` up to the next flag.
    pub fn values_of(&self, flag: &str) -> Vec<&str> {
        self.args
            .iter()
            .skip_while(|a| *a != flag)
            .skip(1)
            .take_while(|a| !a.starts_with("--"))
            .map(String::as_str)
            .collect()
    }

    /// Value following `flag`, if present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.args.iter().map(|a| shell_quote(a)).collect();
        write!(f, "{}", quoted.join(" "))
    }
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::function_descriptor::FunctionDescriptor;
    use serde_json::json;

    fn source() -> FunctionDescriptor {
        FunctionDescriptor::from_json(&json!({
            "Configuration": {
                "FunctionName": "orders-api",
                "Runtime": "python3.11",
                "Role": "arn:aws:iam::123456789012:role/orders",
                "Handler": "app.handler",
                "Timeout": 10,
                "MemorySize": 256,
                "Environment": { "Variables": { "STAGE": "prod", "REGION_HINT": "east" } },
                "Layers": [{ "Arn": "arn:aws:lambda:us-east-1:123456789012:layer:deps:3" }],
                "VpcConfig": { "SubnetIds": ["subnet-a"], "SecurityGroupIds": ["sg-a"] }
            },
            "Code": { "Location": "https://example.com/code.zip" },
            "Tags": { "team": "payments" }
        }))
        .unwrap()
    }

    #[test]
    fn test_no_overrides_keeps_source_settings() {
        let descriptor = source();
        let overrides = CloneOverrides::default();
        assert!(overrides.is_empty());

        let plan = ClonePlan::new("orders-api", "orders-api-copy", &descriptor, &overrides, true)
            .unwrap();
        assert_eq!(plan.settings, descriptor.settings().unwrap());
        assert_eq!(plan.tags.len(), 1);
    }

    #[test]
    fn test_environment_merge_and_clear() {
        let mut overrides = CloneOverrides::default();
        overrides
            .environment
            .insert("STAGE".to_string(), "staging".to_string());
        let merged = overrides.apply(source().settings().unwrap()).unwrap();
        let env = merged.environment.unwrap();
        assert_eq!(env.get("STAGE").map(String::as_str), Some("staging"));
        assert_eq!(env.get("REGION_HINT").map(String::as_str), Some("east"));

        overrides.clear_environment = true;
        let cleared = overrides.apply(source().settings().unwrap()).unwrap();
        let env = cleared.environment.unwrap();
        assert_eq!(env.len(), 1);
        assert!(env.contains_key("STAGE"));

        let only_clear = CloneOverrides {
            clear_environment: true,
            ..Default::default()
        };
        let cleared = only_clear.apply(source().settings().unwrap()).unwrap();
        assert_eq!(cleared.environment, Some(BTreeMap::new()));
    }

    #[test]
    fn test_layers_replace_and_clear() {
        let overrides = CloneOverrides {
            layers: vec!["arn:aws:lambda:us-east-1:123456789012:layer:other:1".to_string()],
            ..Default::default()
        };
        let settings = overrides.apply(source().settings().unwrap()).unwrap();
        assert_eq!(
            settings.layers,
            Some(vec!["arn:aws:lambda:us-east-1:123456789012:layer:other:1".to_string()])
        );

        let overrides = CloneOverrides {
            clear_layers: true,
            ..Default::default()
        };
        let settings = overrides.apply(source().settings().unwrap()).unwrap();
        assert_eq!(settings.layers, Some(vec![]));
    }

    #[test]
    fn test_vpc_overrides() {
        let detach = CloneOverrides {
            detach_vpc: true,
            ..Default::default()
        };
        let settings = detach.apply(source().settings().unwrap()).unwrap();
        assert!(settings.vpc.unwrap().is_detached());

        let swap_groups = CloneOverrides {
            security_group_ids: vec!["sg-b".to_string()],
            ..Default::default()
        };
        let vpc = swap_groups
            .apply(source().settings().unwrap())
            .unwrap()
            .vpc
            .unwrap();
        assert_eq!(vpc.subnet_ids, vec!["subnet-a".to_string()]);
        assert_eq!(vpc.security_group_ids, vec!["sg-b".to_string()]);

        let conflicting = CloneOverrides {
            detach_vpc: true,
            subnet_ids: vec!["subnet-b".to_string()],
            ..Default::default()
        };
        assert!(conflicting.apply(source().settings().unwrap()).is_err());
    }

    #[test]
    fn test_security_groups_without_subnets_rejected() {
        let descriptor = FunctionDescriptor::from_json(&json!({
            "Configuration": {
                "Runtime": "python3.11",
                "Role": "arn:aws:iam::123456789012:role/r",
                "Handler": "app.handler"
            }
        }))
        .unwrap();
        let overrides = CloneOverrides {
            security_group_ids: vec!["sg-b".to_string()],
            ..Default::default()
        };
        assert!(overrides.apply(descriptor.settings().unwrap()).is_err());
    }

    #[test]
    fn test_range_and_architecture_validation() {
        let bad_memory = CloneOverrides {
            memory_size: Some(64),
            ..Default::default()
        };
        assert!(bad_memory.apply(source().settings().unwrap()).is_err());

        let bad_timeout = CloneOverrides {
            timeout: Some(901),
            ..Default::default()
        };
        assert!(bad_timeout.apply(source().settings().unwrap()).is_err());

        let bad_arch = CloneOverrides {
            architecture: Some("riscv".to_string()),
            ..Default::default()
        };
        assert!(bad_arch.apply(source().settings().unwrap()).is_err());

        let arm = CloneOverrides {
            architecture: Some("arm64".to_string()),
            memory_size: Some(1024),
            ..Default::default()
        };
        let settings = arm.apply(source().settings().unwrap()).unwrap();
        assert_eq!(settings.architectures, vec!["arm64".to_string()]);
        assert_eq!(settings.memory_size, 1024);
    }

    #[test]
    fn test_same_name_rejected() {
        let err = ClonePlan::new(
            "orders-api",
            "orders-api",
            &source(),
            &CloneOverrides::default(),
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("identical"));
    }

    #[test]
    fn test_action_for_target() {
        assert_eq!(CloneAction::for_target(false), CloneAction::Create);
        assert_eq!(CloneAction::for_target(true), CloneAction::Update);
    }

    #[test]
    fn test_create_commands() {
        let plan = ClonePlan::new(
            "orders-api",
            "orders-api-copy",
            &source(),
            &CloneOverrides::default(),
            true,
        )
        .unwrap();
        let scope = CommandScope {
            region: Some("eu-west-1".to_string()),
            profile: None,
        };
        let commands = plan.commands(
            CloneAction::Create,
            &CodeArgument::ZipFile(PathBuf::from("/tmp/work/code.zip")),
            &scope,
        );

        assert_eq!(commands.len(), 2);
        let create = &commands[0];
        assert_eq!(create.operation(), "create-function");
        assert_eq!(create.value_of("--function-name"), Some("orders-api-copy"));
        assert_eq!(create.value_of("--zip-file"), Some("fileb:///tmp/work/code.zip"));
        assert_eq!(create.value_of("--runtime"), Some("python3.11"));
        assert_eq!(create.value_of("--memory-size"), Some("256"));
        assert_eq!(create.value_of("--region"), Some("eu-west-1"));
        assert_eq!(create.value_of("--tags"), Some(r#"{"team":"payments"}"#));
        assert_eq!(
            create.value_of("--vpc-config"),
            Some(r#"{"SecurityGroupIds":["sg-a"],"SubnetIds":["subnet-a"]}"#)
        );
        assert_eq!(commands[1].operation(), "wait");
        assert!(commands[1].to_string().contains("function-active-v2"));
    }

    #[test]
    fn test_update_commands_order() {
        let plan = ClonePlan::new(
            "orders-api",
            "orders-api-copy",
            &source(),
            &CloneOverrides::default(),
            false,
        )
        .unwrap();
        let commands = plan.commands(
            CloneAction::Update,
            &CodeArgument::ZipFile(PathBuf::from("code.zip")),
            &CommandScope::default(),
        );

        let operations: Vec<&str> = commands.iter().map(|c| c.operation()).collect();
        assert_eq!(
            operations,
            vec![
                "update-function-code",
                "wait",
                "update-function-configuration",
                "wait"
            ]
        );
        assert!(commands[2].value_of("--zip-file").is_none());
        assert!(commands[2].value_of("--tags").is_none());
    }

    #[test]
    fn test_multiple_layers_render_as_separate_words() {
        let overrides = CloneOverrides {
            layers: vec![
                "arn:aws:lambda:us-east-1:1:layer:a:1".to_string(),
                "arn:aws:lambda:us-east-1:1:layer:b:2".to_string(),
            ],
            architecture: Some("arm64".to_string()),
            ..Default::default()
        };
        let plan = ClonePlan::new("orders-api", "orders-api-copy", &source(), &overrides, false)
            .unwrap();
        let commands = plan.commands(
            CloneAction::Create,
            &CodeArgument::ZipFile(PathBuf::from("code.zip")),
            &CommandScope::default(),
        );

        let create = &commands[0];
        assert_eq!(
            create.values_of("--layers"),
            vec![
                "arn:aws:lambda:us-east-1:1:layer:a:1",
                "arn:aws:lambda:us-east-1:1:layer:b:2"
            ]
        );
        assert_eq!(create.values_of("--architectures"), vec!["arm64"]);
        assert!(create.to_string().contains(
            "--layers arn:aws:lambda:us-east-1:1:layer:a:1 arn:aws:lambda:us-east-1:1:layer:b:2 "
        ));
    }

    #[test]
    fn test_update_configuration_clears_unset_fields() {
        let bare = FunctionDescriptor::from_json(&json!({
            "Configuration": {
                "FunctionName": "a",
                "Runtime": "python3.12",
                "Role": "arn:r",
                "Handler": "h"
            }
        }))
        .unwrap();
        let plan = ClonePlan::new("a", "b", &bare, &CloneOverrides::default(), false).unwrap();
        let commands = plan.commands(
            CloneAction::Update,
            &CodeArgument::ZipFile(PathBuf::from("code.zip")),
            &CommandScope::default(),
        );

        let update = &commands[2];
        assert_eq!(update.operation(), "update-function-configuration");
        assert_eq!(update.value_of("--layers"), Some("[]"));
        assert_eq!(update.value_of("--environment"), Some(r#"{"Variables":{}}"#));
        assert_eq!(
            update.value_of("--vpc-config"),
            Some(r#"{"SecurityGroupIds":[],"SubnetIds":[]}"#)
        );
        assert_eq!(update.value_of("--description"), Some(""));
        assert_eq!(update.value_of("--tracing-config"), Some("Mode=PassThrough"));

        // Create leaves unset fields to the provider defaults.
        let create = &plan.commands(
            CloneAction::Create,
            &CodeArgument::ZipFile(PathBuf::from("code.zip")),
            &CommandScope::default(),
        )[0];
        assert!(create.value_of("--layers").is_none());
        assert!(create.value_of("--environment").is_none());
        assert!(create.value_of("--description").is_none());
    }

    #[test]
    fn test_ephemeral_storage_range() {
        for size in [256, 10_241] {
            let overrides = CloneOverrides {
                ephemeral_storage: Some(size),
                ..Default::default()
            };
            let err = overrides.apply(source().settings().unwrap()).unwrap_err();
            assert!(err.to_string().contains("ephemeral storage"), "{}", err);
        }

        let overrides = CloneOverrides {
            ephemeral_storage: Some(10_240),
            ..Default::default()
        };
        assert_eq!(
            overrides
                .apply(source().settings().unwrap())
                .unwrap()
                .ephemeral_storage,
            10_240
        );
    }

    #[test]
    fn test_shell_quoting() {
        assert_eq!(shell_quote("orders-api"), "orders-api");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote(r#"{"A":"b c"}"#), r#"'{"A":"b c"}'"#);
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
