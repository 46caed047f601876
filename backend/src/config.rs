use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_address: String,
    pub port: u16,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: i64,
    pub recent_window_days: i64,
    pub s3_bucket: Option<String>,
    pub aws_region: Option<String>,
    pub s3_timeout_secs: u64,
    pub seed_username: String,
    pub seed_password: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "sqlite://predictions.db?mode=rwc".to_string(),
            upload_dir: PathBuf::from("uploads"),
            model_path: PathBuf::from("yolov8n.torchscript"),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            recent_window_days: 7,
            s3_bucket: None,
            aws_region: None,
            s3_timeout_secs: 30,
            seed_username: "user".to_string(),
            seed_password: "pass".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the optional YAML file, applies environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(config_str)?)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var("PORT") {
            self.port = port.parse().map_err(|_| ConfigError::Env {
                key: "PORT",
                value: port,
            })?;
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(dir) = env::var("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Ok(model_path) = env::var("MODEL_PATH") {
            self.model_path = PathBuf::from(model_path);
        }
        if let Ok(bucket) = env::var("AWS_S3_BUCKET") {
            self.s3_bucket = Some(bucket).filter(|b| !b.is_empty());
        }
        if let Ok(region) = env::var("AWS_REGION") {
            self.aws_region = Some(region).filter(|r| !r.is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ConfigError::Invalid(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if self.input_size <= 0 || self.input_size % 32 != 0 {
            return Err(ConfigError::Invalid(format!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            )));
        }
        if self.recent_window_days <= 0 {
            return Err(ConfigError::Invalid(
                "recent_window_days must be positive".to_string(),
            ));
        }
        if self.seed_username.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "seed_username must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Bucket and region, when both are configured; S3 is disabled otherwise.
    pub fn s3_target(&self) -> Option<(&str, &str)> {
        Some((self.s3_bucket.as_deref()?, self.aws_region.as_deref()?))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml_str("port: 9000\nupload_dir: /tmp/up\n").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(config.recent_window_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = AppConfig {
            confidence_threshold: 1.5,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_input_size_not_multiple_of_32() {
        let config = AppConfig {
            input_size: 100,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn s3_requires_bucket_and_region() {
        let mut config = AppConfig {
            s3_bucket: Some("bucket".into()),
            ..AppConfig::default()
        };
        assert_eq!(config.s3_target(), None);
        config.aws_region = Some("eu-west-1".into());
        assert_eq!(config.s3_target(), Some(("bucket", "eu-west-1")));
    }
}
