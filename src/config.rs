use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::services::chatrace::{ClientConfig, Credentials, DEFAULT_URL};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub loglevel: String,
    pub chatrace: ChatraceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChatraceConfig {
    pub url: String,
    /// Long-lived token of the business account.
    pub api_token: String,
    pub business_id: String,
    pub user_id: Option<String>,
    /// Token obtained through `chatrace login`. Preferred over `api_token`.
    pub user_token: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Defaults, then the TOML file, then `CHATRACE_` environment variables
    /// (`CHATRACE_CHATRACE__USER_TOKEN` and friends).
    pub fn figment(config_path: &str) -> Figment {
        Figment::new()
            .join(Serialized::default("loglevel", "info"))
            .join(Serialized::default("chatrace.url", DEFAULT_URL))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("CHATRACE_").split("__"))
    }

    pub fn load(config_path: &str) -> Result<Self> {
        Ok(Self::figment(config_path).extract()?)
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            url: self.chatrace.url.clone(),
            timeout_secs: self.chatrace.timeout_secs,
        }
    }

    /// Credentials for authenticated calls: the user token when one is
    /// configured, the API token otherwise.
    pub fn credentials(&self) -> Credentials {
        let token = self
            .chatrace
            .user_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.chatrace.api_token);
        Credentials::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_fill_optional_keys() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [chatrace]
                api_token = "api"
                business_id = "1145545"
                "#,
            )?;

            let config: Config = Config::figment("config.toml").extract()?;
            assert_eq!(config.loglevel, "info");
            assert_eq!(config.chatrace.url, DEFAULT_URL);
            assert_eq!(config.chatrace.timeout_secs, None);
            assert_eq!(config.credentials().token(), "api");
            assert_eq!(config.client().url, DEFAULT_URL);
            Ok(())
        });
    }

    #[test]
    fn user_token_wins_over_api_token() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                loglevel = "debug"
                [chatrace]
                url = "http://localhost:1234/php/user"
                api_token = "api"
                business_id = "1"
                user_token = "user"
                timeout_secs = 5
                "#,
            )?;

            let config = Config::load("config.toml").expect("load");
            assert_eq!(config.loglevel, "debug");
            assert_eq!(config.credentials().token(), "user");
            assert_eq!(
                config.client(),
                ClientConfig {
                    url: "http://localhost:1234/php/user".into(),
                    timeout_secs: Some(5),
                }
            );
            Ok(())
        });
    }

    #[test]
    fn env_overrides_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [chatrace]
                api_token = "api"
                business_id = "1"
                user_token = "from-file"
                "#,
            )?;
            jail.set_env("CHATRACE_CHATRACE__USER_TOKEN", "from-env");
            jail.set_env("CHATRACE_LOGLEVEL", "warn");

            let config: Config = Config::figment("config.toml").extract()?;
            assert_eq!(config.chatrace.user_token.as_deref(), Some("from-env"));
            assert_eq!(config.credentials().token(), "from-env");
            assert_eq!(config.loglevel, "warn");
            Ok(())
        });
    }

    #[test]
    fn env_alone_supplies_required_keys() {
        Jail::expect_with(|jail| {
            jail.set_env("CHATRACE_CHATRACE__API_TOKEN", "api");
            jail.set_env("CHATRACE_CHATRACE__BUSINESS_ID", "acct-1145545");

            let config: Config = Config::figment("missing.toml").extract()?;
            assert_eq!(config.chatrace.api_token, "api");
            assert_eq!(config.chatrace.business_id, "acct-1145545");
            assert_eq!(config.chatrace.url, DEFAULT_URL);
            Ok(())
        });
    }

    #[test]
    fn blank_user_token_falls_back() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [chatrace]
                api_token = "api"
                business_id = "1"
                user_token = "  "
                "#,
            )?;

            let config: Config = Config::figment("config.toml").extract()?;
            assert_eq!(config.credentials().token(), "api");
            Ok(())
        });
    }

    #[test]
    fn api_token_is_required() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[chatrace]\nbusiness_id = \"1\"\n")?;
            assert!(Config::load("config.toml").is_err());
            Ok(())
        });
    }
}
