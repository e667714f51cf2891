use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub storefronts_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub market_request_timeout_secs: u64,
    pub market_user_agent: String,
    /// Page size requested from marketplace listing/attribute endpoints.
    pub market_page_size: u32,
    /// Hard cap on pages walked per paginated endpoint call.
    pub market_max_pages: usize,
    /// Requested batch size for facet lookups; each adapter may clamp this
    /// further to its own API ceiling.
    pub market_batch_size: usize,
    pub market_max_concurrent_batches: usize,
    pub market_inter_page_delay_ms: u64,
    pub market_inter_batch_delay_ms: u64,
    pub market_max_retries: u32,
    pub market_backoff_base_ms: u64,
    /// How long a finished sync job stays observable before the tracker
    /// resets to idle.
    pub job_retention_secs: u64,
    /// Six-field cron expression for the scheduled catalog sync; `None`
    /// disables scheduling entirely.
    pub sync_cron: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("storefronts_path", &self.storefronts_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "market_request_timeout_secs",
                &self.market_request_timeout_secs,
            )
            .field("market_user_agent", &self.market_user_agent)
            .field("market_page_size", &self.market_page_size)
            .field("market_max_pages", &self.market_max_pages)
            .field("market_batch_size", &self.market_batch_size)
            .field(
                "market_max_concurrent_batches",
                &self.market_max_concurrent_batches,
            )
            .field(
                "market_inter_page_delay_ms",
                &self.market_inter_page_delay_ms,
            )
            .field(
                "market_inter_batch_delay_ms",
                &self.market_inter_batch_delay_ms,
            )
            .field("market_max_retries", &self.market_max_retries)
            .field("market_backoff_base_ms", &self.market_backoff_base_ms)
            .field("job_retention_secs", &self.job_retention_secs)
            .field("sync_cron", &self.sync_cron)
            .finish()
    }
}
