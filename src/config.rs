use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub dbdir: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Development mode: serves media files and shows error details.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub staticdir: Option<String>,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub recommendations: RecommendationConfig,
    #[serde(default, rename = "randommovies")]
    pub random_movies: RandomMoviesConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(skip)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default)]
    pub tlscert: Option<String>,
    #[serde(default)]
    pub tlskey: Option<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: default_port(),
            tlscert: None,
            tlskey: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub sqlite: Option<SqliteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteConfig {
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_url")]
    pub url: String,
    #[serde(default = "default_media_root")]
    pub root: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            url: default_media_url(),
            root: default_media_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_name")]
    pub name: String,
    #[serde(default, alias = "contactemail")]
    pub contact_email: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            contact_email: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit", alias = "defaultlimit")]
    pub default_limit: usize,
    #[serde(default = "default_search_max", alias = "maxresults")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_results: default_search_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendationConfig {
    #[serde(default = "default_recommendation_count")]
    pub count: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            count: default_recommendation_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RandomMoviesConfig {
    #[serde(default = "default_random_amount", alias = "defaultamount")]
    pub default_amount: u32,
    #[serde(default = "default_random_max", alias = "maxamount")]
    pub max_amount: u32,
}

impl Default for RandomMoviesConfig {
    fn default() -> Self {
        Self {
            default_amount: default_random_amount(),
            max_amount: default_random_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Sessions unused for this many days are dropped.
    #[serde(default = "default_session_idle_days", alias = "maxidledays")]
    pub max_idle_days: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_idle_days: default_session_idle_days(),
        }
    }
}

fn default_session_idle_days() -> u32 {
    14
}

fn default_port() -> String {
    "8000".to_string()
}

fn default_media_url() -> String {
    "/media/".to_string()
}

fn default_media_root() -> String {
    "media".to_string()
}

fn default_site_name() -> String {
    "MovieRec".to_string()
}

fn default_search_limit() -> usize {
    10
}

fn default_search_max() -> usize {
    100
}

fn default_recommendation_count() -> usize {
    10
}

fn default_random_amount() -> u32 {
    35
}

fn default_random_max() -> u32 {
    100
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_string(), e))?;

        Self::parse(path, &content)
    }

    fn parse(path: &str, content: &str) -> Result<Self, ConfigError> {
        // An empty document parses as null, which serde_yaml rejects.
        if content.trim().is_empty() {
            return Ok(Config::default());
        }

        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(path.to_string(), e))?;

        Ok(config)
    }

    pub fn get_database_path(&self) -> Option<String> {
        if let Some(ref sqlite) = self.database.sqlite {
            return Some(sqlite.filename.clone());
        }

        if let Some(ref dbdir) = self.dbdir {
            let path = PathBuf::from(dbdir).join("movierec.db");
            return Some(path.to_string_lossy().to_string());
        }

        None
    }

    /// True when both a certificate and a key are configured.
    pub fn uses_tls(&self) -> bool {
        self.listen.tlscert.is_some() && self.listen.tlskey.is_some()
    }

    pub fn session_max_idle(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.sessions.max_idle_days))
    }

    /// Media URL prefix without its trailing slash, as a nest path.
    pub fn media_prefix(&self) -> String {
        let trimmed = self.media.url.trim_end_matches('/');
        if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(String, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(String, serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("test.yaml", "").unwrap();
        assert_eq!(config.listen.port, "8000");
        assert!(!config.debug);
        assert_eq!(config.media.url, "/media/");
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.get_database_path(), None);
        assert_eq!(config.sessions.max_idle_days, 14);
        assert!(!config.uses_tls());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
listen:
  address: 127.0.0.1
  port: "9000"
debug: true
dbdir: /var/lib/movierec
media:
  url: uploads
  root: /srv/uploads
site:
  name: Reel Picks
  contactemail: hello@example.com
randommovies:
  maxamount: 20
sessions:
  maxidledays: 3
"#;
        let config = Config::parse("test.yaml", yaml).unwrap();
        assert_eq!(config.listen.address.as_deref(), Some("127.0.0.1"));
        assert!(config.debug);
        assert_eq!(
            config.get_database_path().as_deref(),
            Some("/var/lib/movierec/movierec.db")
        );
        assert_eq!(config.media_prefix(), "/uploads");
        assert_eq!(config.site.contact_email.as_deref(), Some("hello@example.com"));
        assert_eq!(config.random_movies.max_amount, 20);
        assert_eq!(config.random_movies.default_amount, 35);
        assert_eq!(config.session_max_idle(), chrono::Duration::days(3));
    }

    #[test]
    fn test_sqlite_filename_wins_over_dbdir() {
        let yaml = "dbdir: /tmp\ndatabase:\n  sqlite:\n    filename: /data/x.db\n";
        let config = Config::parse("test.yaml", yaml).unwrap();
        assert_eq!(config.get_database_path().as_deref(), Some("/data/x.db"));
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            Config::parse("test.yaml", "listen: [1, 2"),
            Err(ConfigError::ParseError(_, _))
        ));
    }
}
