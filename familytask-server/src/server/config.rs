use serde::Deserialize;
use std::{env, fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt_secret: String,
    /// Guards the direct notification insert route. Unset disables it.
    #[serde(default)]
    pub service_role_key: Option<String>,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
    #[serde(default)]
    pub task_store: TaskStoreKind,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub checkout: Option<CheckoutConfig>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStoreKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    /// No limit when unset.
    pub max_users: Option<i64>,
    /// Allow sign-ups when the user count cannot be read.
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_users: None,
            fail_open: default_fail_open(),
        }
    }
}

fn default_fail_open() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default = "default_checkout_api_base")]
    pub api_base: String,
    pub secret_key: Option<String>,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

fn default_checkout_api_base() -> String {
    "https://api.stripe.com".to_string()
}

impl CheckoutConfig {
    pub fn is_ready(&self) -> bool {
        self.secret_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Invalid(m) => write!(f, "invalid config: {}", m),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        let mut cfg = Self::load_from_path(path)?;
        cfg.apply_overrides(|k| env::var(k).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        let cfg: AppConfig = serde_yaml::from_str(&text)?;
        Ok(cfg)
    }

    /// Secrets may come from the environment instead of the file:
    /// `JWT_SECRET`, `SERVICE_ROLE_KEY`, `PAYMENT_SECRET_KEY`.
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("JWT_SECRET").filter(|v| !v.is_empty()) {
            self.jwt_secret = v;
        }
        if let Some(v) = lookup("SERVICE_ROLE_KEY").filter(|v| !v.is_empty()) {
            self.service_role_key = Some(v);
        }
        if let Some(v) = lookup("PAYMENT_SECRET_KEY").filter(|v| !v.is_empty())
            && let Some(checkout) = self.checkout.as_mut()
        {
            checkout.secret_key = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("jwt_secret must not be empty".into()));
        }
        if let Some(max) = self.registration.max_users
            && max < 0
        {
            return Err(ConfigError::Invalid(
                "registration.max_users must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn has_service_role_key(&self) -> bool {
        self.service_role_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "jwt_secret: s3cret\n";

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: AppConfig = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.task_store, TaskStoreKind::Sqlite);
        assert!(cfg.registration.fail_open);
        assert!(cfg.registration.max_users.is_none());
        assert!(cfg.checkout.is_none());
        assert!(!cfg.has_service_role_key());
        cfg.validate().unwrap();
    }

    #[test]
    fn full_config_parses() {
        let text = r#"
jwt_secret: s3cret
service_role_key: svc
listen_port: 8080
task_store: memory
registration:
  max_users: 10
  fail_open: false
checkout:
  price_id: price_123
  success_url: https://app.example/ok
  cancel_url: https://app.example/cancel
"#;
        let cfg: AppConfig = serde_yaml::from_str(text).unwrap();
        assert_eq!(cfg.task_store, TaskStoreKind::Memory);
        assert_eq!(cfg.registration.max_users, Some(10));
        assert!(!cfg.registration.fail_open);
        let checkout = cfg.checkout.as_ref().unwrap();
        assert_eq!(checkout.api_base, "https://api.stripe.com");
        assert!(!checkout.is_ready());
    }

    #[test]
    fn environment_overrides_secrets() {
        let mut cfg: AppConfig = serde_yaml::from_str(
            "jwt_secret: file\ncheckout:\n  price_id: p\n  success_url: s\n  cancel_url: c\n",
        )
        .unwrap();
        cfg.apply_overrides(|k| match k {
            "JWT_SECRET" => Some("env".into()),
            "SERVICE_ROLE_KEY" => Some("svc".into()),
            "PAYMENT_SECRET_KEY" => Some("sk_test".into()),
            _ => None,
        });
        assert_eq!(cfg.jwt_secret, "env");
        assert!(cfg.has_service_role_key());
        assert!(cfg.checkout.unwrap().is_ready());
    }

    #[test]
    fn empty_secret_is_rejected() {
        let cfg: AppConfig = serde_yaml::from_str("jwt_secret: ''\n").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn shipped_example_is_valid() {
        let cfg: AppConfig =
            serde_yaml::from_str(include_str!("../../config.yaml.example")).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.task_store, TaskStoreKind::Sqlite);
    }
}
