use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Marketplaces the sync engine has an adapter for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Ozon,
    Wildberries,
}

impl std::fmt::Display for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Marketplace::Ozon => write!(f, "ozon"),
            Marketplace::Wildberries => write!(f, "wildberries"),
        }
    }
}

/// One seller account on a marketplace, as declared in `storefronts.yaml`.
///
/// Secrets never live in the file: `api_key_env` (and `client_id_env` for
/// marketplaces that need a client id) name the environment variables the
/// credentials are read from at adapter construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontConfig {
    pub name: String,
    pub marketplace: Marketplace,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Env var holding the API key / token for this account.
    pub api_key_env: String,
    /// Env var holding the client id, for marketplaces that require one.
    pub client_id_env: Option<String>,
    /// Base URL override, used to point at a mock server in tests.
    pub base_url: Option<String>,
    pub notes: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl StorefrontConfig {
    /// Generate a URL-safe slug from the storefront name.
    #[must_use]
    pub fn slug(&self) -> String {
        self.name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else if c == ' ' {
                    '-'
                } else {
                    '\0'
                }
            })
            .filter(|&c| c != '\0')
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[derive(Debug, Deserialize)]
pub struct StorefrontsFile {
    pub storefronts: Vec<StorefrontConfig>,
}

impl StorefrontsFile {
    /// Storefronts the engine should actually sync.
    #[must_use]
    pub fn enabled(&self) -> Vec<&StorefrontConfig> {
        self.storefronts.iter().filter(|s| s.enabled).collect()
    }
}

/// Load and validate the storefront registry from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_storefronts(path: &Path) -> Result<StorefrontsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::StorefrontsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: StorefrontsFile =
        serde_yaml::from_str(&content).map_err(ConfigError::StorefrontsFileParse)?;

    validate_storefronts(&file)?;

    Ok(file)
}

fn validate_storefronts(file: &StorefrontsFile) -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();
    let mut seen_slugs = HashSet::new();

    for storefront in &file.storefronts {
        if storefront.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storefront name must be non-empty".to_string(),
            ));
        }

        if storefront.api_key_env.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "storefront '{}' has an empty api_key_env",
                storefront.name
            )));
        }

        if storefront.marketplace == Marketplace::Ozon && storefront.client_id_env.is_none() {
            return Err(ConfigError::Validation(format!(
                "storefront '{}' targets ozon but has no client_id_env",
                storefront.name
            )));
        }

        let lower_name = storefront.name.to_lowercase();
        if !seen_names.insert(lower_name) {
            return Err(ConfigError::Validation(format!(
                "duplicate storefront name: '{}'",
                storefront.name
            )));
        }

        let slug = storefront.slug();
        if !seen_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate storefront slug: '{}' (from storefront '{}')",
                slug, storefront.name
            )));
        }
    }

    Ok(())
}
