use std::env;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "./chat-minimalist.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    /// Where name and theme live. Shares the message database by default.
    pub prefs_path: PathBuf,
}

impl Config {
    /// Reads `CHAT_DB_PATH` and `CHAT_PREFS_PATH`; call after `dotenv()`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("CHAT_DB_PATH")
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let prefs_path = lookup("CHAT_PREFS_PATH")
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| db_path.clone());
        Config {
            db_path: PathBuf::from(db_path),
            prefs_path: PathBuf::from(prefs_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.prefs_path, config.db_path);
    }

    #[test]
    fn test_prefs_follow_db_path() {
        let config = config_from(&[("CHAT_DB_PATH", "/tmp/chat.db")]);
        assert_eq!(config.prefs_path, PathBuf::from("/tmp/chat.db"));
    }

    #[test]
    fn test_separate_prefs_path() {
        let config = config_from(&[("CHAT_DB_PATH", "/tmp/chat.db"), ("CHAT_PREFS_PATH", "/tmp/ui.db")]);
        assert_eq!(config.prefs_path, PathBuf::from("/tmp/ui.db"));
        let blank = config_from(&[("CHAT_DB_PATH", " ")]);
        assert_eq!(blank.db_path, PathBuf::from(DEFAULT_DB_PATH));
    }
}
