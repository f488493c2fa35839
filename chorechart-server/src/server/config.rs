use serde::Deserialize;
use std::{env, fs, path::Path};

pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub jwt_secret: String,
    pub listen_port: Option<u16>,
    pub dev_cors_origin: Option<String>,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default = "default_session_idle_days")]
    pub session_idle_days: i64,
    /// bcrypt work factor for newly stored PINs.
    #[serde(default = "default_pin_hash_cost")]
    pub pin_hash_cost: u32,
}

fn default_uploads_dir() -> String {
    "uploads".to_string()
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_session_idle_days() -> i64 {
    14
}

fn default_pin_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        let mut cfg = Self::load_from_path(path)?;
        if let Ok(secret) = env::var("JWT_SECRET")
            && !secret.trim().is_empty()
        {
            cfg.jwt_secret = secret;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        let cfg: AppConfig = serde_yaml::from_str(&text)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("jwt_secret must not be empty".into()));
        }
        if self.token_ttl_hours <= 0 {
            return Err(ConfigError::Invalid("token_ttl_hours must be positive".into()));
        }
        if self.session_idle_days <= 0 {
            return Err(ConfigError::Invalid(
                "session_idle_days must be positive".into(),
            ));
        }
        if !(4..=31).contains(&self.pin_hash_cost) {
            return Err(ConfigError::Invalid("pin_hash_cost must be within 4..=31".into()));
        }
        Ok(())
    }

    /// `PORT` wins over `listen_port`.
    pub fn port(&self) -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .or(self.listen_port)
            .unwrap_or(DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        f.write_all(text.as_bytes()).expect("write");
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config("jwt_secret: s3cret\n");
        let cfg = AppConfig::load_from_path(f.path()).expect("load");
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.uploads_dir, "uploads");
        assert_eq!(cfg.token_ttl_hours, 24);
        assert_eq!(cfg.session_idle_days, 14);
        assert_eq!(cfg.pin_hash_cost, 12);
        assert!(cfg.listen_port.is_none());
        assert!(cfg.dev_cors_origin.is_none());
        cfg.validate().expect("valid");
    }

    #[test]
    fn full_config_parses() {
        let f = write_config(
            "jwt_secret: abc\nlisten_port: 8080\ndev_cors_origin: http://localhost:5173\n\
             uploads_dir: /srv/uploads\ntoken_ttl_hours: 2\nsession_idle_days: 1\n",
        );
        let cfg = AppConfig::load_from_path(f.path()).expect("load");
        assert_eq!(cfg.listen_port, Some(8080));
        assert_eq!(cfg.dev_cors_origin.as_deref(), Some("http://localhost:5173"));
        assert_eq!(cfg.uploads_dir, "/srv/uploads");
        assert_eq!(cfg.token_ttl_hours, 2);
        assert_eq!(cfg.session_idle_days, 1);
    }

    #[test]
    fn blank_secret_is_rejected() {
        let f = write_config("jwt_secret: '  '\n");
        let cfg = AppConfig::load_from_path(f.path()).expect("load");
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn out_of_range_hash_cost_is_rejected() {
        let f = write_config("jwt_secret: abc\npin_hash_cost: 2\n");
        let cfg = AppConfig::load_from_path(f.path()).expect("load");
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let f = write_config("jwt_secret: [unterminated\n");
        let err = AppConfig::load_from_path(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AppConfig::load_from_path(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
