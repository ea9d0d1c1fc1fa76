//! Runtime configuration, built from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::notify::SmtpSettings;

/// Process-wide settings.
///
/// Every knob has a default so a bare environment still runs. Notifier
/// blocks come back `None` when their variables are unset, which disables
/// that notifier instead of failing startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where the libsql database file lives.
    pub db_path: PathBuf,
    /// Directory watched for inbound claim documents.
    pub drop_dir: PathBuf,
    /// Directory processed documents are moved into.
    pub archive_dir: PathBuf,
    /// Optional YAML rules file; the built-in rules apply when unset.
    pub rules_path: Option<PathBuf>,
    /// Seconds between full pipeline runs.
    pub ingest_interval_secs: u64,
    /// Seconds between health checks.
    pub health_interval_secs: u64,
    /// Days to keep stored emails and archived documents.
    pub archive_keep_days: u32,
    /// Teams incoming-webhook URL; unset disables Teams cards.
    pub teams_webhook_url: Option<SecretString>,
    /// SMTP alert relay; unset disables email alerts.
    pub smtp: Option<SmtpSettings>,
    /// Deployment environment label ("development", "production", ...).
    pub environment: String,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Directory for daily-rotated log files; unset logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Build settings from environment variables.
    pub fn from_env() -> Self {
        let db_path = std::env::var("CLAIMS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/claims.db"));

        let drop_dir = std::env::var("CLAIMS_DROP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/inbound"));

        let archive_dir = std::env::var("CLAIMS_ARCHIVE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/archive"));

        let rules_path = std::env::var("CLAIMS_RULES_PATH").ok().map(PathBuf::from);

        let ingest_interval_secs: u64 = std::env::var("INGEST_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(14_400);

        let health_interval_secs: u64 = std::env::var("HEALTH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3_600);

        let archive_keep_days: u32 = std::env::var("ARCHIVE_KEEP_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(90);

        let teams_webhook_url = std::env::var("TEAMS_WEBHOOK_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_dir = std::env::var("CLAIMS_LOG_DIR").ok().map(PathBuf::from);

        Self {
            db_path,
            drop_dir,
            archive_dir,
            rules_path,
            ingest_interval_secs,
            health_interval_secs,
            archive_keep_days,
            teams_webhook_url,
            smtp: SmtpSettings::from_env(),
            environment,
            log_level,
            log_dir,
        }
    }

    /// Check values that would otherwise fail at an awkward time: a zero
    /// interval panics the timer loops, and a production deployment with
    /// no alert channel leaves pipeline failures invisible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INGEST_INTERVAL_SECS".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }
        if self.health_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HEALTH_INTERVAL_SECS".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }
        if self.environment == "production"
            && self.teams_webhook_url.is_none()
            && self.smtp.is_none()
        {
            return Err(ConfigError::MissingEnvVar(
                "TEAMS_WEBHOOK_URL or SMTP_SERVER".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Settings {
        Settings {
            db_path: PathBuf::from("./data/claims.db"),
            drop_dir: PathBuf::from("./data/inbound"),
            archive_dir: PathBuf::from("./data/archive"),
            rules_path: None,
            ingest_interval_secs: 14_400,
            health_interval_secs: 3_600,
            archive_keep_days: 90,
            teams_webhook_url: None,
            smtp: None,
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }

    #[test]
    fn development_runs_without_notifiers() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn production_requires_an_alert_channel() {
        let mut settings = base();
        settings.environment = "production".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingEnvVar(_))
        ));

        settings.teams_webhook_url =
            Some(SecretString::from("https://example.webhook.office.com/x"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut settings = base();
        settings.ingest_interval_secs = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "INGEST_INTERVAL_SECS"
        ));
    }
}
