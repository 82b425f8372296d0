use crate::errors::ConfigError;

/// Static thresholds and run-shaped configuration, read from the environment
/// the same way the teacher's `main.rs` reads `CLICKHOUSE_URL` et al.:
/// `std::env::var(...).ok()` with explicit defaults, never a config file for
/// these — spec.md §6 names these as the recognized environment variables.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub settling_days: i64,
    pub worker_pool_size: usize,
    pub run_timeout_secs: u64,
    pub per_property_timeout_secs: u64,
    pub blob_root: String,
    pub registry_key: String,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
}

const DEFAULT_SETTLING_DAYS: i64 = 3;
const DEFAULT_RUN_TIMEOUT_SECS: u64 = 600;
const DEFAULT_PER_PROPERTY_TIMEOUT_SECS: u64 = 60;

impl RunConfig {
    /// Reads recognized environment variables; unrecognized ones are
    /// ignored (spec.md §6). `property_count` sizes the default worker pool
    /// to `min(#properties * 4, 16)` per spec.md §5.
    pub fn from_env(property_count: usize) -> Result<Self, ConfigError> {
        let settling_days = env_parsed("SETTLING_DAYS").unwrap_or(DEFAULT_SETTLING_DAYS);
        if settling_days < 0 {
            return Err(ConfigError::Invalid("SETTLING_DAYS must be >= 0".to_string()));
        }

        let default_pool = (property_count * 4).min(16).max(1);
        let worker_pool_size = env_parsed("WORKER_POOL_SIZE").unwrap_or(default_pool);

        let run_timeout_secs = env_parsed("RUN_TIMEOUT_SECONDS").unwrap_or(DEFAULT_RUN_TIMEOUT_SECS);

        let blob_root = std::env::var("SENTINEL_BLOB_ROOT").unwrap_or_else(|_| "./sentinel_data".to_string());
        let registry_key = std::env::var("SENTINEL_REGISTRY_KEY").unwrap_or_else(|_| "config/properties.json".to_string());

        let smtp = SmtpConfig {
            host: std::env::var("SENTINEL_SMTP_HOST").ok(),
            port: env_parsed("SENTINEL_SMTP_PORT").unwrap_or(587),
            user: std::env::var("SENTINEL_SMTP_USER").ok(),
            pass: std::env::var("SENTINEL_SMTP_PASS").ok(),
            from: std::env::var("SENTINEL_SMTP_FROM").unwrap_or_else(|_| "sentinel@localhost".to_string()),
        };

        Ok(Self {
            settling_days,
            worker_pool_size,
            run_timeout_secs,
            per_property_timeout_secs: DEFAULT_PER_PROPERTY_TIMEOUT_SECS,
            blob_root,
            registry_key,
            smtp,
        })
    }

    pub fn reference_date_override() -> Option<chrono::NaiveDate> {
        std::env::var("REFERENCE_DATE_OVERRIDE")
            .ok()
            .and_then(|s| chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_pool_size_is_capped_at_16() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::remove_var("WORKER_POOL_SIZE");
        let cfg = RunConfig::from_env(50).unwrap();
        assert_eq!(cfg.worker_pool_size, 16);
    }

    #[test]
    fn default_pool_size_scales_with_properties() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::remove_var("WORKER_POOL_SIZE");
        let cfg = RunConfig::from_env(2).unwrap();
        assert_eq!(cfg.worker_pool_size, 8);
    }
}
