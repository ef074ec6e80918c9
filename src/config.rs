use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// Discord ids show up both as JSON numbers and as strings.
#[derive(Deserialize, Clone)]
#[serde(untagged)]
enum Snowflake {
    Number(u64),
    Text(String),
}

impl Snowflake {
    fn parse(self, field: &str) -> Result<u64, ConfigError> {
        match self {
            Snowflake::Number(n) => Ok(n),
            Snowflake::Text(s) => s.trim().parse::<u64>().map_err(|_| {
                ConfigError::Validation(format!("{field} must be a numeric id, got '{s}'"))
            }),
        }
    }
}

#[derive(Deserialize)]
struct PresenceFile {
    name: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ConfigFile {
    token: String,
    bot_user_id: Snowflake,
    owner_id: Snowflake,
    #[serde(default)]
    debug_mode: bool,
    /// Accounts that non-owners may never remove or crown.
    #[serde(default, alias = "blocklist")]
    protected_ids: Vec<Snowflake>,
    /// Target of the nuisance shortcut commands.
    nuisance_user_id: Option<Snowflake>,
    /// Directory for state files (logs, restriction store). Defaults to current directory.
    data_dir: Option<String>,
    /// Channel that receives forwarded warnings and errors.
    log_channel_id: Option<Snowflake>,
    api_base: Option<String>,
    presence: Option<PresenceFile>,
    #[serde(default)]
    accept_friend_requests: bool,
    #[serde(default = "default_friend_poll_seconds")]
    friend_poll_seconds: u64,
}

fn default_friend_poll_seconds() -> u64 {
    60
}

const BOT_SCHEME: &str = "Bot ";

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v9";

/// Presence shown once the session is ready.
#[derive(Debug, Clone)]
pub struct Presence {
    pub name: String,
    /// When set, the presence is shown as a stream.
    pub url: Option<String>,
}

impl Default for Presence {
    fn default() -> Self {
        Self {
            name: "groupwarden".to_string(),
            url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Bare token, without any `Bot ` scheme.
    pub token: String,
    pub bot_user_id: u64,
    pub owner_id: u64,
    pub debug_mode: bool,
    pub protected_ids: HashSet<u64>,
    pub nuisance_user_id: Option<u64>,
    /// Directory for state files (logs, restriction store).
    pub data_dir: PathBuf,
    pub log_channel_id: Option<u64>,
    /// REST API root, without trailing slash.
    pub api_base: String,
    pub presence: Presence,
    pub accept_friend_requests: bool,
    pub friend_poll_seconds: u64,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        let token = file.token.trim();
        let token = token.strip_prefix(BOT_SCHEME).unwrap_or(token).trim().to_string();
        if token.is_empty() {
            return Err(ConfigError::Validation("token is required".into()));
        }

        let bot_user_id = file.bot_user_id.parse("bot_user_id")?;
        let owner_id = file.owner_id.parse("owner_id")?;
        if bot_user_id == 0 {
            return Err(ConfigError::Validation("bot_user_id must be non-zero".into()));
        }
        if owner_id == 0 {
            return Err(ConfigError::Validation("owner_id must be non-zero".into()));
        }
        if file.friend_poll_seconds == 0 {
            return Err(ConfigError::Validation("friend_poll_seconds must be greater than zero".into()));
        }

        let protected_ids = file
            .protected_ids
            .into_iter()
            .map(|id| id.parse("protected_ids"))
            .collect::<Result<HashSet<_>, _>>()?;
        let nuisance_user_id = file
            .nuisance_user_id
            .map(|id| id.parse("nuisance_user_id"))
            .transpose()?;
        let log_channel_id = file
            .log_channel_id
            .map(|id| id.parse("log_channel_id"))
            .transpose()?;

        let api_base = file
            .api_base
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let presence = file
            .presence
            .map(|p| Presence { name: p.name, url: p.url })
            .unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            token,
            bot_user_id,
            owner_id,
            debug_mode: file.debug_mode,
            protected_ids,
            nuisance_user_id,
            data_dir,
            log_channel_id,
            api_base,
            presence,
            accept_friend_requests: file.accept_friend_requests,
            friend_poll_seconds: file.friend_poll_seconds,
        })
    }

    /// `Authorization` value for both the gateway and the REST client.
    ///
    /// serenity prefixes any token lacking a scheme with `Bot `, so the REST
    /// client must send exactly the same string or its calls come back 401.
    pub fn authorization(&self) -> String {
        format!("{BOT_SCHEME}{}", self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config() {
        let file = write_config(r#"{
            "token": "abc.def.ghi",
            "bot_user_id": "111",
            "owner_id": 222,
            "blocklist": [333, "444"]
        }"#);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.bot_user_id, 111);
        assert_eq!(config.owner_id, 222);
        assert_eq!(config.protected_ids, HashSet::from([333, 444]));
        assert_eq!(config.authorization(), "Bot abc.def.ghi");
        assert!(!config.debug_mode);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.friend_poll_seconds, 60);
        assert!(config.nuisance_user_id.is_none());
    }

    #[test]
    fn test_optional_fields() {
        let file = write_config(r#"{
            "token": "abc",
            "bot_user_id": 1,
            "owner_id": 2,
            "debug_mode": true,
            "nuisance_user_id": "720022112466894970",
            "log_channel_id": 99,
            "api_base": "http://localhost:9000/api/",
            "presence": { "name": "watching", "url": "https://www.twitch.tv/example" },
            "accept_friend_requests": true,
            "friend_poll_seconds": 15
        }"#);
        let config = Config::load(file.path()).unwrap();
        assert!(config.debug_mode);
        assert_eq!(config.nuisance_user_id, Some(720022112466894970));
        assert_eq!(config.log_channel_id, Some(99));
        assert_eq!(config.api_base, "http://localhost:9000/api");
        assert_eq!(config.presence.name, "watching");
        assert!(config.presence.url.is_some());
        assert!(config.accept_friend_requests);
        assert_eq!(config.friend_poll_seconds, 15);
    }

    #[test]
    fn test_scheme_prefix_is_not_doubled() {
        let file = write_config(r#"{ "token": " Bot abc ", "bot_user_id": 1, "owner_id": 2 }"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.authorization(), "Bot abc");
    }

    #[test]
    fn test_gateway_keeps_authorization_as_is() {
        let file = write_config(r#"{ "token": "abc.def", "bot_user_id": 1, "owner_id": 2 }"#);
        let config = Config::load(file.path()).unwrap();
        let http = serenity::http::Http::new(&config.authorization());
        assert_eq!(http.token(), config.authorization());
    }

    #[test]
    fn test_scheme_only_token_is_empty() {
        let file = write_config(r#"{ "token": "Bot ", "bot_user_id": 1, "owner_id": 2 }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_empty_token() {
        let file = write_config(r#"{ "token": "  ", "bot_user_id": 1, "owner_id": 2 }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_zero_owner() {
        let file = write_config(r#"{ "token": "t", "bot_user_id": 1, "owner_id": 0 }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("owner_id"));
    }

    #[test]
    fn test_non_numeric_id() {
        let file = write_config(r#"{ "token": "t", "bot_user_id": "me", "owner_id": 2 }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("bot_user_id"));
    }

    #[test]
    fn test_zero_poll_interval() {
        let file = write_config(r#"{
            "token": "t", "bot_user_id": 1, "owner_id": 2, "friend_poll_seconds": 0
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("friend_poll_seconds"));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
