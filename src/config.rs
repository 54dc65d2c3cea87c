use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use log::debug;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingMode {
    /// Database only
    Db,
    /// Filesystem only
    Hdd,
    Both,
}

impl WorkingMode {
    pub fn uses_database(self) -> bool {
        matches!(self, WorkingMode::Db | WorkingMode::Both)
    }

    pub fn uses_disk(self) -> bool {
        matches!(self, WorkingMode::Hdd | WorkingMode::Both)
    }
}

impl FromStr for WorkingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DB" => Ok(WorkingMode::Db),
            "HDD" => Ok(WorkingMode::Hdd),
            "BOTH" => Ok(WorkingMode::Both),
            other => Err(ConfigError::Invalid {
                name: "WORKING_MODE",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for WorkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkingMode::Db => "DB",
            WorkingMode::Hdd => "HDD",
            WorkingMode::Both => "BOTH",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    /// Accepted and validated, but the subject patterns themselves are fixed.
    pub subject_pattern: String,
    pub mode: WorkingMode,
    pub destination_dir: Option<PathBuf>,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub server: String,
    pub port: u16,
    pub use_starttls: bool,
    pub username: String,
    pub password: String,
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

/// Every parameter as it arrives, before validation. Keys are the
/// lower-cased parameter names.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    server_address: Option<String>,
    server_imap_port: Option<String>,
    use_starttls: Option<String>,
    imap_user_name: Option<String>,
    imap_user_pass: Option<String>,
    imap_folder_name: Option<String>,
    subject_pattern: Option<String>,
    working_mode: Option<String>,
    destination_folder: Option<String>,
    db_host: Option<String>,
    db_port: Option<String>,
    db_name: Option<String>,
    db_user: Option<String>,
    db_password: Option<String>,
}

const DEFAULT_DB_PORT: u16 = 5432;

impl Config {
    /// Builds the configuration from `NAME:VALUE` tokens, falling back to
    /// process environment variables for any name not given on the command line.
    pub fn from_args(tokens: &[String]) -> Result<Self, ConfigError> {
        Self::load(tokens, None)
    }

    /// Same as [`Config::from_args`] but reads the fallback variables from
    /// `env` instead of the process environment.
    pub fn from_args_with_env(
        tokens: &[String],
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        Self::load(tokens, Some(env))
    }

    fn load(tokens: &[String], env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Environment::default().source(env));

        for (name, value) in parse_tokens(tokens)? {
            debug!("Parameter {} provided on the command line", name);
            builder = builder.set_override(name.to_lowercase(), value)?;
        }

        let raw: RawSettings = builder.build()?.try_deserialize()?;
        Self::validate(raw)
    }

    fn validate(raw: RawSettings) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();

        let server = required(&raw.server_address, "SERVER_ADDRESS", &mut missing);
        let port = required(&raw.server_imap_port, "SERVER_IMAP_PORT", &mut missing);
        let starttls = required(&raw.use_starttls, "USE_STARTTLS", &mut missing);
        let username = required(&raw.imap_user_name, "IMAP_USER_NAME", &mut missing);
        let password = required(&raw.imap_user_pass, "IMAP_USER_PASS", &mut missing);
        let folder = required(&raw.imap_folder_name, "IMAP_FOLDER_NAME", &mut missing);
        let subject_pattern = required(&raw.subject_pattern, "SUBJECT_PATTERN", &mut missing);
        let mode = required(&raw.working_mode, "WORKING_MODE", &mut missing);

        let mode = match mode {
            Some(value) => Some(value.parse::<WorkingMode>()?),
            None => None,
        };

        let (mut destination, mut db) = (None, None);
        if let Some(mode) = mode {
            if mode.uses_disk() {
                destination = required(&raw.destination_folder, "DESTINATION_FOLDER", &mut missing);
            }
            if mode.uses_database() {
                db = Some((
                    required(&raw.db_host, "DB_HOST", &mut missing),
                    required(&raw.db_name, "DB_NAME", &mut missing),
                    required(&raw.db_user, "DB_USER", &mut missing),
                    required(&raw.db_password, "DB_PASSWORD", &mut missing),
                ));
            }
        }

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        // Every required value is present past this point.
        let (
            Some(server),
            Some(port),
            Some(starttls),
            Some(username),
            Some(password),
            Some(folder),
            Some(subject_pattern),
            Some(mode),
        ) = (server, port, starttls, username, password, folder, subject_pattern, mode)
        else {
            return Err(ConfigError::Missing(Vec::new()));
        };

        let database = match db {
            Some((Some(host), Some(database), Some(username), Some(password))) => {
                let port = match &raw.db_port {
                    Some(value) => parse_port("DB_PORT", value)?,
                    None => DEFAULT_DB_PORT,
                };
                Some(DatabaseConfig {
                    host,
                    port,
                    database,
                    username,
                    password,
                })
            }
            _ => None,
        };

        Ok(Config {
            imap: ImapConfig {
                port: parse_port("SERVER_IMAP_PORT", &port)?,
                use_starttls: parse_bool("USE_STARTTLS", &starttls)?,
                server,
                username,
                password,
                folder,
            },
            subject_pattern,
            mode,
            destination_dir: destination.map(PathBuf::from),
            database,
        })
    }
}

/// Splits `NAME:VALUE` tokens on the first colon. A token without a colon,
/// or starting with one, is rejected.
fn parse_tokens(tokens: &[String]) -> Result<Vec<(String, String)>, ConfigError> {
    tokens
        .iter()
        .map(|token| match token.find(':') {
            Some(pos) if pos > 0 => Ok((token[..pos].to_string(), token[pos + 1..].to_string())),
            _ => Err(ConfigError::InvalidToken(token.clone())),
        })
        .collect()
}

fn required(
    value: &Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    if value.is_none() {
        missing.push(name);
    }
    value.clone()
}

fn parse_port(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn imap_tokens() -> Vec<&'static str> {
        vec![
            "SERVER_ADDRESS:imap.example.com",
            "SERVER_IMAP_PORT:993",
            "USE_STARTTLS:false",
            "IMAP_USER_NAME:reports@example.com",
            "IMAP_USER_PASS:secret:with:colons",
            "IMAP_FOLDER_NAME:INBOX",
            "SUBJECT_PATTERN:subscription",
        ]
    }

    #[test]
    fn test_hdd_mode() {
        let mut list = imap_tokens();
        list.push("WORKING_MODE:HDD");
        list.push("DESTINATION_FOLDER:/tmp/reports");

        let config = Config::from_args_with_env(&tokens(&list), HashMap::new()).unwrap();
        assert_eq!(config.mode, WorkingMode::Hdd);
        assert_eq!(config.imap.port, 993);
        assert_eq!(config.imap.password, "secret:with:colons");
        assert_eq!(config.destination_dir, Some(PathBuf::from("/tmp/reports")));
        assert!(config.database.is_none());
    }

    #[test]
    fn test_both_mode_requires_db_and_folder() {
        let mut list = imap_tokens();
        list.push("WORKING_MODE:BOTH");
        list.push("DB_HOST:localhost");

        let err = Config::from_args_with_env(&tokens(&list), HashMap::new()).unwrap_err();
        match err {
            ConfigError::Missing(names) => {
                assert_eq!(names, vec!["DESTINATION_FOLDER", "DB_NAME", "DB_USER", "DB_PASSWORD"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_environment_fallback() {
        let mut list = imap_tokens();
        list.push("WORKING_MODE:DB");

        let env: HashMap<String, String> = [
            ("DB_HOST", "db.local"),
            ("DB_NAME", "reports"),
            ("DB_USER", "loader"),
            ("DB_PASSWORD", "pw"),
            ("DB_PORT", "6543"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::from_args_with_env(&tokens(&list), env).unwrap();
        let db = config.database.unwrap();
        assert_eq!(db.url(), "postgres://loader:pw@db.local:6543/reports");
    }

    #[test]
    fn test_invalid_values() {
        let mut list = imap_tokens();
        list.push("WORKING_MODE:CLOUD");
        let err = Config::from_args_with_env(&tokens(&list), HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "WORKING_MODE", .. }));

        let err = Config::from_args_with_env(&tokens(&["SERVER_ADDRESS"]), HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidToken(_)));

        let err = Config::from_args_with_env(&tokens(&[":value"]), HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidToken(_)));
    }

    #[test]
    fn test_missing_everything() {
        let err = Config::from_args_with_env(&[], HashMap::new()).unwrap_err();
        match err {
            ConfigError::Missing(names) => {
                assert_eq!(names.len(), 8);
                assert_eq!(names[0], "SERVER_ADDRESS");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
