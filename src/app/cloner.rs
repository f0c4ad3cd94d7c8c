//! End-to-end clone of one function onto another name.
//!
//! The flow is strictly sequential: fetch the source descriptor, save it,
//! extract settings, download the code, probe the target, then create or
//! (after confirmation) update it, waiting for the function to settle after
//! every mutating call. Nothing is rolled back on failure; the working
//! directory keeps whatever was written up to that point.

use super::clone_plan::{
    CloneAction, CloneOverrides, ClonePlan, CodeArgument, CommandLine, CommandScope,
};
use super::function_descriptor::{CodeOrigin, FunctionDescriptor};
use super::lambda_service::{CodeSource, FunctionPlatform};
use super::prompt::OverwritePrompt;
use super::waiter::{wait_until_stable, WaitPolicy};
use super::workspace::{self, Workspace};
use anyhow::{bail, Context, Result};
use chrono::Local;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Everything a single run needs to know.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub source_name: String,
    pub target_name: String,
    pub overrides: CloneOverrides,
    pub copy_tags: bool,
    pub dry_run: bool,
    pub wait_policy: WaitPolicy,
    /// Parent of the timestamped working directory.
    pub work_root: PathBuf,
    pub command_scope: CommandScope,
}

#[derive(Debug)]
pub enum CloneOutcome {
    Created {
        workspace: PathBuf,
        target: FunctionDescriptor,
    },
    Updated {
        workspace: PathBuf,
        target: FunctionDescriptor,
    },
    /// The target exists and the operator chose not to overwrite it.
    Declined { workspace: PathBuf },
    DryRun {
        workspace: PathBuf,
        action: CloneAction,
        commands: Vec<CommandLine>,
    },
}

impl CloneOutcome {
    pub fn workspace(&self) -> &PathBuf {
        match self {
            CloneOutcome::Created { workspace, .. }
            | CloneOutcome::Updated { workspace, .. }
            | CloneOutcome::Declined { workspace }
            | CloneOutcome::DryRun { workspace, .. } => workspace,
        }
    }
}

pub struct FunctionCloner<'a> {
    platform: &'a dyn FunctionPlatform,
    prompt: &'a dyn OverwritePrompt,
}

impl<'a> FunctionCloner<'a> {
    pub fn new(platform: &'a dyn FunctionPlatform, prompt: &'a dyn OverwritePrompt) -> Self {
        Self { platform, prompt }
    }

    pub async fn run(&self, request: &CloneRequest) -> Result<CloneOutcome> {
        let source_name = request.source_name.as_str();
        let target_name = request.target_name.as_str();

        info!("Fetching source function {}", source_name);
        let Some(source) = self.platform.get_function(source_name).await? else {
            bail!("Source function '{}' does not exist", source_name);
        };

        let workspace = Workspace::create(&request.work_root, source_name, target_name, Local::now())?;
        workspace.write_json(workspace::SOURCE_DESCRIPTOR_FILE, &source)?;

        let source = FunctionDescriptor::from_json(
            &workspace.read_json(workspace::SOURCE_DESCRIPTOR_FILE)?,
        )?;
        let plan = ClonePlan::new(
            source_name,
            target_name,
            &source,
            &request.overrides,
            request.copy_tags,
        )
        .with_context(|| format!("Cannot clone function {}", source_name))?;
        workspace.write_json(workspace::PLAN_FILE, &plan)?;

        let settings = &plan.settings;
        if request.overrides.is_empty() {
            debug!("No overrides, copying settings as-is");
        } else {
            info!("Applying overrides: {:?}", request.overrides);
        }
        if settings.vpc.as_ref().is_some_and(|v| v.is_detached()) {
            info!("Target will be detached from its VPC");
        }
        info!(
            "Source settings: runtime={} handler={} memory={}MB timeout={}s architectures={}",
            settings.runtime.as_deref().unwrap_or("-"),
            settings.handler.as_deref().unwrap_or("-"),
            settings.memory_size,
            settings.timeout,
            settings.architectures.join(",")
        );

        let (code, code_argument) = self.fetch_code(&source, &workspace).await?;

        let target_exists = self.platform.get_function(target_name).await?.is_some();
        let action = CloneAction::for_target(target_exists);
        info!("Target function {}: {:?}", target_name, action);

        if request.dry_run {
            let commands = plan.commands(action, &code_argument, &request.command_scope);
            let script: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
            workspace.write_text(workspace::COMMANDS_FILE, &(script.join("\n") + "\n"))?;
            return Ok(CloneOutcome::DryRun {
                workspace: workspace.path().to_path_buf(),
                action,
                commands,
            });
        }

        match action {
            CloneAction::Create => {
                info!("Creating function {}", target_name);
                let response = self.platform.create_function(&plan, &code).await?;
                workspace.write_json(workspace::CREATE_RESPONSE_FILE, &response)?;
                wait_until_stable(self.platform, target_name, request.wait_policy).await?;
            }
            CloneAction::Update => {
                if !self.prompt.confirm_overwrite(target_name)? {
                    warn!("Operator declined to overwrite {}", target_name);
                    return Ok(CloneOutcome::Declined {
                        workspace: workspace.path().to_path_buf(),
                    });
                }

                info!("Updating code of function {}", target_name);
                let response = self
                    .platform
                    .update_function_code(target_name, &code, &settings.architectures)
                    .await?;
                workspace.write_json(workspace::UPDATE_CODE_RESPONSE_FILE, &response)?;
                wait_until_stable(self.platform, target_name, request.wait_policy).await?;

                info!("Updating configuration of function {}", target_name);
                let response = self
                    .platform
                    .update_function_configuration(
                        target_name,
                        &settings.with_explicit_clears(),
                    )
                    .await?;
                workspace.write_json(workspace::UPDATE_CONFIGURATION_RESPONSE_FILE, &response)?;
                wait_until_stable(self.platform, target_name, request.wait_policy).await?;
            }
        }

        let target = self
            .platform
            .get_function(target_name)
            .await?
            .with_context(|| format!("Function {} vanished after the clone", target_name))?;
        workspace.write_json(workspace::TARGET_DESCRIPTOR_FILE, &target)?;

        let workspace = workspace.path().to_path_buf();
        Ok(match action {
            CloneAction::Create => CloneOutcome::Created { workspace, target },
            CloneAction::Update => CloneOutcome::Updated { workspace, target },
        })
    }

    /// Download (or reference) the source code package.
    async fn fetch_code(
        &self,
        source: &FunctionDescriptor,
        workspace: &Workspace,
    ) -> Result<(CodeSource, CodeArgument)> {
        match source.code_origin()? {
            CodeOrigin::Archive(location) => {
                info!("Downloading code package");
                let bytes = self.platform.download_code(&location).await?;
                let summary = workspace::summarize_archive(&bytes)?;
                info!(
                    "Code package: {} bytes, {} entries, {} bytes uncompressed",
                    bytes.len(),
                    summary.entries,
                    summary.uncompressed_bytes
                );
                let path = workspace.write_bytes(workspace::CODE_ARCHIVE_FILE, &bytes)?;
                Ok((CodeSource::Zip(bytes), CodeArgument::ZipFile(path)))
            }
            CodeOrigin::Image(uri) => {
                info!("Source is an image function: {}", uri);
                Ok((CodeSource::Image(uri.clone()), CodeArgument::ImageUri(uri)))
            }
        }
    }
}
