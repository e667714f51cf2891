use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by {marketplace} (retry after {retry_after_secs}s)")]
    RateLimited {
        marketplace: String,
        retry_after_secs: u64,
    },

    #[error("{marketplace} API error: {message}")]
    ApiError {
        marketplace: String,
        message: String,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("pagination limit reached for {context}: exceeded {max_pages} pages")]
    PaginationLimit { context: String, max_pages: usize },

    #[error("storefront '{storefront}' is missing credentials: env var {var} is not set")]
    MissingCredentials { storefront: String, var: String },

    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,
}
