use super::clone_plan::ClonePlan;
use super::function_descriptor::{
    CodeLocation, DeadLetterConfigDocument, EnvironmentDocument, EphemeralStorageDocument,
    FunctionConfiguration, FunctionDescriptor, FunctionSettings, ImageConfigDocument,
    ImageConfigResponseDocument, LayerReference, TracingConfigDocument, VpcConfigDocument,
    VpcPlacement,
};
use super::waiter::FunctionState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_lambda as lambda;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{
    Architecture, DeadLetterConfig, Environment, EphemeralStorage, FunctionCode, ImageConfig,
    Runtime, TracingConfig, TracingMode, VpcConfig,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Code package handed to create/update calls.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeSource {
    Zip(Vec<u8>),
    Image(String),
}

/// The function-as-a-service calls a clone needs.
#[async_trait]
pub trait FunctionPlatform: Send + Sync {
    /// Full descriptor, or `None` when the function does not exist.
    async fn get_function(&self, function_name: &str) -> Result<Option<FunctionDescriptor>>;

    /// Fetch the code archive from a presigned location.
    async fn download_code(&self, location: &str) -> Result<Vec<u8>>;

    async fn create_function(
        &self,
        plan: &ClonePlan,
        code: &CodeSource,
    ) -> Result<FunctionConfiguration>;

    async fn update_function_code(
        &self,
        function_name: &str,
        code: &CodeSource,
        architectures: &[String],
    ) -> Result<FunctionConfiguration>;

    async fn update_function_configuration(
        &self,
        function_name: &str,
        settings: &FunctionSettings,
    ) -> Result<FunctionConfiguration>;

    async fn get_function_state(&self, function_name: &str) -> Result<FunctionState>;
}

/// [`FunctionPlatform`] backed by the AWS Lambda API.
pub struct LambdaService {
    client: lambda::Client,
    http: reqwest::Client,
}

impl LambdaService {
    pub fn new(aws_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: lambda::Client::new(aws_config),
            http: reqwest::Client::new(),
        }
    }
}

/// Render any Lambda response carrying function-configuration fields into
/// the provider's document shape.
macro_rules! configuration_document {
    ($source:expr) => {{
        let c = $source;
        FunctionConfiguration {
            function_name: c.function_name.clone(),
            function_arn: c.function_arn.clone(),
            runtime: c.runtime.as_ref().map(|r| r.as_str().to_string()),
            role: c.role.clone(),
            handler: c.handler.clone(),
            code_size: Some(c.code_size),
            description: c.description.clone(),
            timeout: c.timeout,
            memory_size: c.memory_size,
            last_modified: c.last_modified.clone(),
            code_sha256: c.code_sha256.clone(),
            version: c.version.clone(),
            vpc_config: c.vpc_config.as_ref().map(|v| VpcConfigDocument {
                subnet_ids: v.subnet_ids.clone().unwrap_or_default(),
                security_group_ids: v.security_group_ids.clone().unwrap_or_default(),
                vpc_id: v.vpc_id.clone().filter(|id| !id.is_empty()),
            }),
            environment: c.environment.as_ref().map(|e| EnvironmentDocument {
                variables: e
                    .variables
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .collect(),
            }),
            layers: c
                .layers
                .as_ref()
                .map(|layers| {
                    layers
                        .iter()
                        .filter_map(|l| {
                            l.arn.clone().map(|arn| LayerReference {
                                arn,
                                code_size: Some(l.code_size),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
            state: c.state.as_ref().map(|s| s.as_str().to_string()),
            state_reason: c.state_reason.clone(),
            last_update_status: c
                .last_update_status
                .as_ref()
                .map(|s| s.as_str().to_string()),
            last_update_status_reason: c.last_update_status_reason.clone(),
            package_type: c.package_type.as_ref().map(|p| p.as_str().to_string()),
            architectures: c
                .architectures
                .as_ref()
                .map(|a| a.iter().map(|x| x.as_str().to_string()).collect())
                .unwrap_or_default(),
            ephemeral_storage: c
                .ephemeral_storage
                .as_ref()
                .map(|e| EphemeralStorageDocument { size: e.size }),
            tracing_config: c.tracing_config.as_ref().map(|t| TracingConfigDocument {
                mode: t.mode.as_ref().map(|m| m.as_str().to_string()),
            }),
            dead_letter_config: c
                .dead_letter_config
                .as_ref()
                .map(|d| DeadLetterConfigDocument {
                    target_arn: d.target_arn.clone(),
                }),
            kms_key_arn: c.kms_key_arn.clone(),
            image_config_response: c.image_config_response.as_ref().map(|r| {
                ImageConfigResponseDocument {
                    image_config: r.image_config.as_ref().map(|i| ImageConfigDocument {
                        entry_point: i.entry_point.clone().unwrap_or_default(),
                        command: i.command.clone().unwrap_or_default(),
                        working_directory: i.working_directory.clone(),
                    }),
                }
            }),
        }
    }};
}

/// Set the configuration fields shared by `CreateFunction` and
/// `UpdateFunctionConfiguration` on a request builder.
macro_rules! with_configuration {
    ($request:expr, $settings:expr) => {{
        let s: &FunctionSettings = $settings;
        let mut request = $request
            .role(&s.role)
            .timeout(s.timeout)
            .memory_size(s.memory_size)
            .ephemeral_storage(ephemeral_storage(s.ephemeral_storage)?);
        if let Some(runtime) = &s.runtime {
            request = request.runtime(Runtime::from(runtime.as_str()));
        }
        if let Some(handler) = &s.handler {
            request = request.handler(handler);
        }
        if let Some(description) = &s.description {
            request = request.description(description);
        }
        if let Some(layers) = &s.layers {
            request = request.set_layers(Some(layers.clone()));
        }
        if let Some(variables) = &s.environment {
            request = request.environment(environment(variables));
        }
        if let Some(placement) = &s.vpc {
            request = request.vpc_config(vpc_config(placement));
        }
        if let Some(mode) = &s.tracing_mode {
            request = request.tracing_config(
                TracingConfig::builder()
                    .mode(TracingMode::from(mode.as_str()))
                    .build(),
            );
        }
        if let Some(target_arn) = &s.dead_letter_target_arn {
            request = request
                .dead_letter_config(DeadLetterConfig::builder().target_arn(target_arn).build());
        }
        if let Some(key) = &s.kms_key_arn {
            request = request.kms_key_arn(key);
        }
        if let Some(image_config) = &s.image_config {
            request = request.image_config(image_config_request(image_config));
        }
        request
    }};
}

fn ephemeral_storage(size: i32) -> Result<EphemeralStorage> {
    EphemeralStorage::builder()
        .size(size)
        .build()
        .context("Invalid ephemeral storage size")
}

fn environment(variables: &BTreeMap<String, String>) -> Environment {
    let variables: HashMap<String, String> = variables
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Environment::builder().set_variables(Some(variables)).build()
}

fn vpc_config(placement: &VpcPlacement) -> VpcConfig {
    VpcConfig::builder()
        .set_subnet_ids(Some(placement.subnet_ids.clone()))
        .set_security_group_ids(Some(placement.security_group_ids.clone()))
        .build()
}

fn image_config_request(document: &ImageConfigDocument) -> ImageConfig {
    ImageConfig::builder()
        .set_entry_point(Some(document.entry_point.clone()))
        .set_command(Some(document.command.clone()))
        .set_working_directory(document.working_directory.clone())
        .build()
}

fn architectures(names: &[String]) -> Vec<Architecture> {
    names.iter().map(|a| Architecture::from(a.as_str())).collect()
}

#[async_trait]
impl FunctionPlatform for LambdaService {
    async fn get_function(&self, function_name: &str) -> Result<Option<FunctionDescriptor>> {
        let response = match self
            .client
            .get_function()
            .function_name(function_name)
            .send()
            .await
        {
            Ok(response) => response,
            Err(sdk_error) => {
                let not_found = sdk_error
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                if not_found {
                    debug!("Function {} does not exist", function_name);
                    return Ok(None);
                }
                return Err(sdk_error)
                    .with_context(|| format!("Failed to get function {}", function_name));
            }
        };

        let configuration = response
            .configuration
            .as_ref()
            .map(|c| configuration_document!(c));

        let code = response.code.as_ref().map(|code| CodeLocation {
            repository_type: code.repository_type.clone(),
            location: code.location.clone(),
            image_uri: code.image_uri.clone(),
            resolved_image_uri: code.resolved_image_uri.clone(),
        });

        let tags: BTreeMap<String, String> = response
            .tags
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        Ok(Some(FunctionDescriptor {
            configuration,
            code,
            tags,
        }))
    }

    async fn download_code(&self, location: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(location)
            .send()
            .await
            .context("Failed to download function code package")?
            .error_for_status()
            .context("Code package download was rejected")?;

        let bytes = response
            .bytes()
            .await
            .context("Failed to read function code package")?;

        debug!("Downloaded code package ({} bytes)", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn create_function(
        &self,
        plan: &ClonePlan,
        code: &CodeSource,
    ) -> Result<FunctionConfiguration> {
        let settings = &plan.settings;
        let function_code = match code {
            CodeSource::Zip(bytes) => FunctionCode::builder()
                .zip_file(Blob::new(bytes.clone()))
                .build(),
            CodeSource::Image(uri) => FunctionCode::builder().image_uri(uri).build(),
        };

        let mut request = with_configuration!(
            self.client
                .create_function()
                .function_name(&plan.target_name)
                .package_type(lambda::types::PackageType::from(
                    settings.package_type.as_str()
                ))
                .code(function_code)
                .set_architectures(Some(architectures(&settings.architectures))),
            settings
        );

        if !plan.tags.is_empty() {
            let tags: HashMap<String, String> = plan
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            request = request.set_tags(Some(tags));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to create function {}", plan.target_name))?;

        Ok(configuration_document!(&response))
    }

    async fn update_function_code(
        &self,
        function_name: &str,
        code: &CodeSource,
        architectures_list: &[String],
    ) -> Result<FunctionConfiguration> {
        let mut request = self
            .client
            .update_function_code()
            .function_name(function_name)
            .set_architectures(Some(architectures(architectures_list)));

        request = match code {
            CodeSource::Zip(bytes) => request.zip_file(Blob::new(bytes.clone())),
            CodeSource::Image(uri) => request.image_uri(uri),
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to update code of function {}", function_name))?;

        Ok(configuration_document!(&response))
    }

    async fn update_function_configuration(
        &self,
        function_name: &str,
        settings: &FunctionSettings,
    ) -> Result<FunctionConfiguration> {
        let request = with_configuration!(
            self.client
                .update_function_configuration()
                .function_name(function_name),
            settings
        );

        let response = request.send().await.with_context(|| {
            format!(
                "Failed to update configuration of function {}",
                function_name
            )
        })?;

        Ok(configuration_document!(&response))
    }

    async fn get_function_state(&self, function_name: &str) -> Result<FunctionState> {
        let response = self
            .client
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
            .with_context(|| format!("Failed to get state of function {}", function_name))?;

        Ok(FunctionState {
            state: response.state.as_ref().map(|s| s.as_str().to_string()),
            state_reason: response.state_reason.clone(),
            last_update_status: response
                .last_update_status
                .as_ref()
                .map(|s| s.as_str().to_string()),
            last_update_status_reason: response.last_update_status_reason.clone(),
        })
    }
}
