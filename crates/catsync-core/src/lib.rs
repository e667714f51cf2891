use thiserror::Error;

pub mod app_config;
mod config;
pub mod offers;
pub mod storefronts;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use offers::{
    AttributesRecord, ImageRecord, ListedOffer, MergedOffer, PriceRecord, PriceTag, StockLevel,
    StockRecord,
};
pub use storefronts::{load_storefronts, Marketplace, StorefrontConfig, StorefrontsFile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingEnvVar(String),

    #[error("environment variable {var} has an invalid value: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read storefronts file {path}: {source}")]
    StorefrontsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse storefronts file: {0}")]
    StorefrontsFileParse(#[from] serde_yaml::Error),

    #[error("storefronts validation failed: {0}")]
    Validation(String),
}
