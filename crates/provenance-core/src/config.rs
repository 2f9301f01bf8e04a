//! Environment-driven configuration.

use serde::{Deserialize, Serialize};

use crate::currency::Currency;
use crate::encryption::ProviderSettings;
use crate::error::{Result, ToolkitError};
use crate::gateway::{normalize_base, DEFAULT_GATEWAY};

pub const ENV_GATEWAY: &str = "PROVENANCE_GATEWAY";
pub const ENV_NODE: &str = "PROVENANCE_NODE";
pub const ENV_CURRENCY: &str = "PROVENANCE_CURRENCY";
pub const ENV_LIT_CHAIN: &str = "PROVENANCE_LIT_CHAIN";
pub const ENV_LIT_NETWORK: &str = "PROVENANCE_LIT_NETWORK";
pub const ENV_TACO_DOMAIN: &str = "TACO_DOMAIN";
pub const ENV_TACO_RITUAL_ID: &str = "TACO_RITUAL_ID";

pub const DEFAULT_NODE: &str = "https://node1.irys.xyz";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolkitConfig {
    /// Gateway base, always ending in `/`.
    pub gateway: String,
    pub node: String,
    pub currency: Option<String>,
    pub providers: ProviderSettings,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            gateway: DEFAULT_GATEWAY.to_string(),
            node: DEFAULT_NODE.to_string(),
            currency: None,
            providers: ProviderSettings::default(),
        }
    }
}

impl ToolkitConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let taco_ritual_id = match get(ENV_TACO_RITUAL_ID) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                ToolkitError::validation(format!("{ENV_TACO_RITUAL_ID} must be an integer, got `{raw}`"))
            })?,
            None => defaults.providers.taco_ritual_id,
        };

        Ok(Self {
            gateway: normalize_base(&get(ENV_GATEWAY).unwrap_or(defaults.gateway)),
            node: get(ENV_NODE).unwrap_or(defaults.node),
            currency: get(ENV_CURRENCY),
            providers: ProviderSettings {
                lit_chain: get(ENV_LIT_CHAIN).unwrap_or(defaults.providers.lit_chain),
                lit_network: get(ENV_LIT_NETWORK).unwrap_or(defaults.providers.lit_network),
                taco_domain: get(ENV_TACO_DOMAIN).unwrap_or(defaults.providers.taco_domain),
                taco_ritual_id,
            },
        })
    }

    /// The configured currency, if one is set and known.
    pub fn currency(&self) -> Result<Option<Currency>> {
        self.currency
            .as_deref()
            .map(|name| {
                Currency::lookup(name)
                    .ok_or_else(|| ToolkitError::validation(format!("unknown currency `{name}`")))
            })
            .transpose()
    }
}
