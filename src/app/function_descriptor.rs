//! Function descriptor documents and the settings extracted from them.
//!
//! A descriptor is the `GetFunction` document the Lambda API returns: the
//! function configuration, the code location and the tag set. The structs
//! below mirror the provider's PascalCase JSON so a descriptor saved to disk
//! can be read back with plain serde. Unknown fields are ignored.
//!
//! [`FunctionDescriptor::settings`] pulls out the handful of scalar fields a
//! clone needs, filling provider defaults for anything the document omits.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider default timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: i32 = 3;
/// Provider default memory size, in MB.
pub const DEFAULT_MEMORY_MB: i32 = 128;
/// Provider default `/tmp` size, in MB.
pub const DEFAULT_EPHEMERAL_STORAGE_MB: i32 = 512;
/// Instruction set used when the descriptor lists none.
pub const DEFAULT_ARCHITECTURE: &str = "x86_64";

/// Full `GetFunction` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<FunctionConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeLocation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Function configuration as returned by `GetFunction`,
/// `GetFunctionConfiguration`, `CreateFunction` and the update calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_config: Option<VpcConfigDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<LayerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_storage: Option<EphemeralStorageDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing_config: Option<TracingConfigDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_config: Option<DeadLetterConfigDocument>,
    #[serde(
        default,
        rename = "KMSKeyArn",
        skip_serializing_if = "Option::is_none"
    )]
    pub kms_key_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_config_response: Option<ImageConfigResponseDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CodeLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_type: Option<String>,
    /// Presigned download URL, valid for a few minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_image_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcConfigDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnet_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentDocument {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerReference {
    pub arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_size: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EphemeralStorageDocument {
    pub size: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TracingConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeadLetterConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfigResponseDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfigDocument>,
}

/// Container overrides of an image function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfigDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_point: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

impl ImageConfigDocument {
    pub fn is_empty(&self) -> bool {
        self.entry_point.is_empty() && self.command.is_empty() && self.working_directory.is_none()
    }
}

/// Deployment package format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageType {
    Zip,
    Image,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Zip => "Zip",
            PackageType::Image => "Image",
        }
    }
}

/// Network placement of a function.
///
/// An empty placement detaches the function from its VPC.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VpcPlacement {
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
}

impl VpcPlacement {
    pub fn is_detached(&self) -> bool {
        self.subnet_ids.is_empty() && self.security_group_ids.is_empty()
    }
}

/// The fields a clone carries over to the target function.
///
/// `layers`, `environment` and `vpc` are tri-state: `None` leaves the
/// target untouched (or omits the field on create), `Some` of an empty
/// value clears it explicitly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSettings {
    pub package_type: PackageType,
    pub runtime: Option<String>,
    pub handler: Option<String>,
    pub role: String,
    pub description: Option<String>,
    pub timeout: i32,
    pub memory_size: i32,
    pub ephemeral_storage: i32,
    pub architectures: Vec<String>,
    pub layers: Option<Vec<String>>,
    pub environment: Option<BTreeMap<String, String>>,
    pub vpc: Option<VpcPlacement>,
    pub tracing_mode: Option<String>,
    pub dead_letter_target_arn: Option<String>,
    pub kms_key_arn: Option<String>,
    /// Image functions only.
    pub image_config: Option<ImageConfigDocument>,
}

/// Tracing mode Lambda applies when none is configured.
pub const DEFAULT_TRACING_MODE: &str = "PassThrough";

impl FunctionSettings {
    /// Turn every "leave untouched" field into an explicit reset.
    ///
    /// An update must leave the target matching the source, so anything the
    /// source does not set is cleared on the target instead of being omitted
    /// from the request.
    pub fn with_explicit_clears(&self) -> FunctionSettings {
        let mut settings = self.clone();
        settings.layers.get_or_insert_with(Vec::new);
        settings.environment.get_or_insert_with(BTreeMap::new);
        settings.vpc.get_or_insert_with(VpcPlacement::default);
        settings.description.get_or_insert_with(String::new);
        settings
            .tracing_mode
            .get_or_insert_with(|| DEFAULT_TRACING_MODE.to_string());
        settings.dead_letter_target_arn.get_or_insert_with(String::new);
        settings.kms_key_arn.get_or_insert_with(String::new);
        if settings.package_type == PackageType::Image {
            settings
                .image_config
                .get_or_insert_with(ImageConfigDocument::default);
        }
        settings
    }
}

/// Where the source code package lives.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeOrigin {
    /// Presigned URL of a zip archive.
    Archive(String),
    /// Container image reference.
    Image(String),
}

impl FunctionDescriptor {
    /// Parse a descriptor from the provider's JSON.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).context("Malformed function descriptor")
    }

    pub fn configuration(&self) -> Result<&FunctionConfiguration> {
        self.configuration
            .as_ref()
            .context("Function descriptor has no Configuration section")
    }

    pub fn function_name(&self) -> Option<&str> {
        self.configuration
            .as_ref()
            .and_then(|c| c.function_name.as_deref())
    }

    /// Extract clone settings, applying provider defaults for absent fields.
    pub fn settings(&self) -> Result<FunctionSettings> {
        let config = self.configuration()?;
        let package_type = config.package_type()?;

        let role = config
            .role
            .clone()
            .filter(|r| !r.is_empty())
            .context("Function descriptor has no Role")?;

        let runtime = config.runtime.clone().filter(|r| !r.is_empty());
        let handler = config.handler.clone().filter(|h| !h.is_empty());
        if package_type == PackageType::Zip {
            if runtime.is_none() {
                bail!("Zip-packaged function descriptor has no Runtime");
            }
            if handler.is_none() {
                bail!("Zip-packaged function descriptor has no Handler");
            }
        }

        let architectures = if config.architectures.is_empty() {
            vec![DEFAULT_ARCHITECTURE.to_string()]
        } else {
            config.architectures.clone()
        };

        let layers = if config.layers.is_empty() {
            None
        } else {
            Some(config.layers.iter().map(|l| l.arn.clone()).collect())
        };

        let environment = config
            .environment
            .as_ref()
            .map(|e| e.variables.clone())
            .filter(|vars| !vars.is_empty());

        // Only a placement with subnets attaches a function to a VPC.
        let vpc = config
            .vpc_config
            .as_ref()
            .filter(|v| !v.subnet_ids.is_empty())
            .map(|v| VpcPlacement {
                subnet_ids: v.subnet_ids.clone(),
                security_group_ids: v.security_group_ids.clone(),
            });

        Ok(FunctionSettings {
            package_type,
            runtime,
            handler,
            role,
            description: config.description.clone().filter(|d| !d.is_empty()),
            timeout: config.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            memory_size: config.memory_size.unwrap_or(DEFAULT_MEMORY_MB),
            ephemeral_storage: config
                .ephemeral_storage
                .map(|e| e.size)
                .unwrap_or(DEFAULT_EPHEMERAL_STORAGE_MB),
            architectures,
            layers,
            environment,
            vpc,
            tracing_mode: config
                .tracing_config
                .as_ref()
                .and_then(|t| t.mode.clone())
                .filter(|m| m != DEFAULT_TRACING_MODE),
            dead_letter_target_arn: config
                .dead_letter_config
                .as_ref()
                .and_then(|d| d.target_arn.clone())
                .filter(|t| !t.is_empty()),
            kms_key_arn: config.kms_key_arn.clone().filter(|k| !k.is_empty()),
            image_config: if package_type == PackageType::Image {
                config
                    .image_config_response
                    .as_ref()
                    .and_then(|r| r.image_config.clone())
                    .filter(|c| !c.is_empty())
            } else {
                None
            },
        })
    }

    /// Locate the code package to copy.
    pub fn code_origin(&self) -> Result<CodeOrigin> {
        let package_type = self.configuration()?.package_type()?;
        let code = self
            .code
            .as_ref()
            .context("Function descriptor has no Code section")?;

        match package_type {
            PackageType::Zip => code
                .location
                .clone()
                .filter(|l| !l.is_empty())
                .map(CodeOrigin::Archive)
                .context("Function descriptor has no code Location"),
            PackageType::Image => code
                .image_uri
                .clone()
                .or_else(|| code.resolved_image_uri.clone())
                .filter(|u| !u.is_empty())
                .map(CodeOrigin::Image)
                .context("Image function descriptor has no ImageUri"),
        }
    }
}

impl FunctionConfiguration {
    pub fn package_type(&self) -> Result<PackageType> {
        match self.package_type.as_deref() {
            None | Some("Zip") => Ok(PackageType::Zip),
            Some("Image") => Ok(PackageType::Image),
            Some(other) => bail!("Unsupported PackageType '{}'", other),
        }
    }
}
