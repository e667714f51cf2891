use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("CATSYNC_ENV", "development"));

    let bind_addr = parse_addr("CATSYNC_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("CATSYNC_LOG_LEVEL", "info");
    let storefronts_path = PathBuf::from(or_default(
        "CATSYNC_STOREFRONTS_PATH",
        "./config/storefronts.yaml",
    ));

    let db_max_connections = parse_u32("CATSYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CATSYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CATSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let market_request_timeout_secs = parse_u64("CATSYNC_MARKET_REQUEST_TIMEOUT_SECS", "30")?;
    let market_user_agent = or_default("CATSYNC_MARKET_USER_AGENT", "catsync/0.1 (catalog-sync)");
    let market_page_size = parse_u32("CATSYNC_MARKET_PAGE_SIZE", "200")?;
    let market_max_pages = parse_usize("CATSYNC_MARKET_MAX_PAGES", "500")?;
    let market_batch_size = parse_usize("CATSYNC_MARKET_BATCH_SIZE", "500")?;
    let market_max_concurrent_batches = parse_usize("CATSYNC_MARKET_MAX_CONCURRENT_BATCHES", "2")?;
    let market_inter_page_delay_ms = parse_u64("CATSYNC_MARKET_INTER_PAGE_DELAY_MS", "250")?;
    let market_inter_batch_delay_ms = parse_u64("CATSYNC_MARKET_INTER_BATCH_DELAY_MS", "200")?;
    let market_max_retries = parse_u32("CATSYNC_MARKET_MAX_RETRIES", "3")?;
    let market_backoff_base_ms = parse_u64("CATSYNC_MARKET_BACKOFF_BASE_MS", "1000")?;

    let job_retention_secs = parse_u64("CATSYNC_JOB_RETENTION_SECS", "300")?;
    let sync_cron = lookup("CATSYNC_SYNC_CRON")
        .ok()
        .filter(|s| !s.trim().is_empty());

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        storefronts_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        market_request_timeout_secs,
        market_user_agent,
        market_page_size,
        market_max_pages,
        market_batch_size,
        market_max_concurrent_batches,
        market_inter_page_delay_ms,
        market_inter_batch_delay_ms,
        market_max_retries,
        market_backoff_base_ms,
        job_retention_secs,
        sync_cron,
    })
}

fn parse_environment(raw: &str) -> Environment {
    match raw.to_lowercase().as_str() {
        "production" | "prod" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Result<String, std::env::VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    fn minimal_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([("DATABASE_URL", "postgres://localhost/catsync")])
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let map = HashMap::new();
        let err = build_app_config(lookup_from(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(var) if var == "DATABASE_URL"));
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let map = minimal_env();
        let config = build_app_config(lookup_from(&map)).expect("config should build");

        assert_eq!(config.env, Environment::Development);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.market_page_size, 200);
        assert_eq!(config.market_max_pages, 500);
        assert_eq!(config.market_batch_size, 500);
        assert_eq!(config.market_max_concurrent_batches, 2);
        assert_eq!(config.market_max_retries, 3);
        assert_eq!(config.market_backoff_base_ms, 1_000);
        assert_eq!(config.job_retention_secs, 300);
        assert!(config.sync_cron.is_none());
    }

    #[test]
    fn invalid_numeric_value_is_reported_with_var_name() {
        let mut map = minimal_env();
        map.insert("CATSYNC_MARKET_MAX_RETRIES", "lots");
        let err = build_app_config(lookup_from(&map)).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "CATSYNC_MARKET_MAX_RETRIES"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn blank_sync_cron_counts_as_disabled() {
        let mut map = minimal_env();
        map.insert("CATSYNC_SYNC_CRON", "   ");
        let config = build_app_config(lookup_from(&map)).expect("config should build");
        assert!(config.sync_cron.is_none());
    }

    #[test]
    fn sync_cron_is_passed_through() {
        let mut map = minimal_env();
        map.insert("CATSYNC_SYNC_CRON", "0 0 3 * * *");
        let config = build_app_config(lookup_from(&map)).expect("config should build");
        assert_eq!(config.sync_cron.as_deref(), Some("0 0 3 * * *"));
    }

    #[test]
    fn production_environment_is_recognised() {
        let mut map = minimal_env();
        map.insert("CATSYNC_ENV", "production");
        let config = build_app_config(lookup_from(&map)).expect("config should build");
        assert_eq!(config.env, Environment::Production);
    }

    #[test]
    fn debug_redacts_database_url() {
        let map = minimal_env();
        let config = build_app_config(lookup_from(&map)).expect("config should build");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("postgres://localhost/catsync"));
        assert!(rendered.contains("[redacted]"));
    }
}
