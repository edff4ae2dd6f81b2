use std::env;
use std::path::PathBuf;

/// Environment variable names - single source of truth
pub mod env_vars {
    /// Parent directory of the vault (the vault itself is `<dir>/vault`)
    pub const DATA_DIR: &str = "PM_DATA_DIR";
    pub const PORT: &str = "PORT";
    pub const BIND_ADDR: &str = "PM_BIND_ADDR";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
    /// Model retried once when the primary one is rejected
    pub const OPENAI_MODEL_FALLBACK: &str = "OPENAI_MODEL_FALLBACK";
    pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
}

/// Default values
pub mod defaults {
    pub const DATA_DIR: &str = "./data";
    pub const PORT: u16 = 8787;
    pub const BIND_ADDR: &str = "127.0.0.1";
    pub const OPENAI_MODEL: &str = "gpt-4o-mini";
    pub const OPENAI_MODEL_FALLBACK: &str = "gpt-4o-mini";
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
}

/// Settings for the story field-suggestion service
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Suggestions are disabled when unset
    pub api_key: Option<String>,
    pub model: String,
    pub fallback_model: String,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub port: u16,
    pub bind_addr: String,
    pub openai: OpenAiConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = match get(env_vars::PORT) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!(
                    "[CONFIG] {}={} is not a valid port, using {}",
                    env_vars::PORT,
                    raw,
                    defaults::PORT
                );
                defaults::PORT
            }),
            None => defaults::PORT,
        };

        Self {
            data_dir: PathBuf::from(or_default(env_vars::DATA_DIR, defaults::DATA_DIR)),
            port,
            bind_addr: or_default(env_vars::BIND_ADDR, defaults::BIND_ADDR),
            openai: OpenAiConfig {
                api_key: get(env_vars::OPENAI_API_KEY),
                model: or_default(env_vars::OPENAI_MODEL, defaults::OPENAI_MODEL),
                fallback_model: or_default(
                    env_vars::OPENAI_MODEL_FALLBACK,
                    defaults::OPENAI_MODEL_FALLBACK,
                ),
                base_url: or_default(env_vars::OPENAI_BASE_URL, defaults::OPENAI_BASE_URL)
                    .trim_end_matches('/')
                    .to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.port, 8787);
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert!(config.openai.api_key.is_none());
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            (env_vars::DATA_DIR, "/srv/pm"),
            (env_vars::PORT, "9000"),
            (env_vars::OPENAI_API_KEY, "sk-test"),
            (env_vars::OPENAI_MODEL, "gpt-x"),
            (env_vars::OPENAI_BASE_URL, "http://localhost:1234/v1/"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/srv/pm"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.openai.model, "gpt-x");
        assert_eq!(config.openai.fallback_model, "gpt-4o-mini");
        assert_eq!(config.openai.base_url, "http://localhost:1234/v1");
    }

    #[test]
    fn test_bad_port_and_blank_key_fall_back() {
        let config = config_from(&[(env_vars::PORT, "eighty"), (env_vars::OPENAI_API_KEY, "  ")]);
        assert_eq!(config.port, defaults::PORT);
        assert!(config.openai.api_key.is_none());
    }
}
