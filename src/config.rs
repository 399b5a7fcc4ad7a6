use chrono::Duration;
use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::services::formation::EngineSettings;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub storage_dir: PathBuf,
    pub directory_file: PathBuf,
    pub public_url: String,
    pub proposal_expiry_days: i64,
    pub proposal_retention_days: i64,
    pub sweep_interval_secs: u64,
    pub jwt_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            storage_dir: PathBuf::from("./storage"),
            directory_file: PathBuf::from("./storage/directory.json"),
            public_url: "http://127.0.0.1:9090".to_string(),
            proposal_expiry_days: 3,
            proposal_retention_days: 30,
            sweep_interval_secs: 300,
            jwt_secret: "cohort_development_secret".to_string(),
        }
    }
}

impl Config {
    fn get_env(key: &str, default: String) -> String {
        env::var(key).unwrap_or(default)
    }

    fn get_parsed<T: FromStr + ToString>(key: &str, default: T) -> T {
        match env::var(key) {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("{}='{}' is not valid, using {}", key, raw, default.to_string());
                default
            }),
            Err(_) => default,
        }
    }

    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Config {
            bind_addr: Self::get_env("COHORT_BIND_ADDR", defaults.bind_addr),
            storage_dir: PathBuf::from(Self::get_env(
                "COHORT_STORAGE_DIR",
                defaults.storage_dir.to_string_lossy().into_owned(),
            )),
            directory_file: PathBuf::from(Self::get_env(
                "COHORT_DIRECTORY_FILE",
                defaults.directory_file.to_string_lossy().into_owned(),
            )),
            public_url: Self::get_env("COHORT_PUBLIC_URL", defaults.public_url),
            proposal_expiry_days: Self::get_parsed("COHORT_PROPOSAL_EXPIRY_DAYS", defaults.proposal_expiry_days),
            proposal_retention_days: Self::get_parsed(
                "COHORT_PROPOSAL_RETENTION_DAYS",
                defaults.proposal_retention_days,
            ),
            sweep_interval_secs: Self::get_parsed("COHORT_SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            jwt_secret: Self::get_env("JWT_SECRET", defaults.jwt_secret),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            expiry_window: Duration::days(self.proposal_expiry_days),
            retention: Duration::days(self.proposal_retention_days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        env::set_var("COHORT_TEST_SWEEP_INTERVAL", "soon");
        assert_eq!(Config::get_parsed("COHORT_TEST_SWEEP_INTERVAL", 300u64), 300);
        env::set_var("COHORT_TEST_SWEEP_INTERVAL", " 60 ");
        assert_eq!(Config::get_parsed("COHORT_TEST_SWEEP_INTERVAL", 300u64), 60);
        env::remove_var("COHORT_TEST_SWEEP_INTERVAL");
    }

    #[test]
    fn engine_settings_follow_day_counts() {
        let config = Config {
            proposal_expiry_days: 5,
            proposal_retention_days: 10,
            ..Config::default()
        };
        let settings = config.engine_settings();
        assert_eq!(settings.expiry_window, Duration::days(5));
        assert_eq!(settings.retention, Duration::days(10));
    }
}
