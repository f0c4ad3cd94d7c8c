use anyhow::{bail, Result};
use aws_config::BehaviorVersion;
use aws_types::region::Region;
use tracing::{debug, info};

/// Where the SDK should find credentials and which endpoint to call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSettings {
    /// Explicit region; otherwise the standard chain (env, profile) decides.
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Custom endpoint, e.g. LocalStack.
    pub endpoint_url: Option<String>,
}

impl ClientSettings {
    /// Fill unset fields from `fallback`.
    pub fn with_fallback(self, fallback: ClientSettings) -> ClientSettings {
        ClientSettings {
            region: self.region.or(fallback.region),
            profile: self.profile.or(fallback.profile),
            endpoint_url: self.endpoint_url.or(fallback.endpoint_url),
        }
    }
}

/// Create the SDK config for this run.
///
/// Uses the default credential chain (environment, shared profile, SSO,
/// instance role), narrowed to `settings.profile` when given. Fails if no
/// region can be resolved, since every call is regional.
pub async fn load_sdk_config(settings: &ClientSettings) -> Result<aws_config::SdkConfig> {
    debug!("Loading AWS config with {:?}", settings);

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = &settings.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint) = &settings.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let config = loader.load().await;

    match config.region() {
        Some(region) => info!("Using region {}", region),
        None => bail!(
            "No AWS region configured: pass it as the third argument, set AWS_REGION, \
             or configure one in your AWS profile"
        ),
    }

    Ok(config)
}
