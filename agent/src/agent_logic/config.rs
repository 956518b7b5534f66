use anyhow::{Context, Result};
use clap::Parser;
use lib_dashboard::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "dashboard_agent.json";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Traffic violation dashboard agent", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "DASHBOARD_CONFIG_PATH", help = "Path to the JSON engine configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "DASHBOARD_BASE_URL", help = "Backend base URL for HTTP calls.")]
    pub base_url: Option<String>,

    #[clap(long, env = "DASHBOARD_PUSH_URL", help = "Backend WebSocket push endpoint.")]
    pub push_url: Option<String>,

    #[clap(long, env = "DASHBOARD_TOKEN_PATH", help = "File the session token is persisted to.")]
    pub token_path: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_POLL_INTERVAL_MS", help = "Status poll interval while the push channel is down.")]
    pub poll_interval_ms: Option<u64>,

    #[clap(long, env = "DASHBOARD_RECONNECT_ATTEMPTS", help = "Push reconnect attempts before waiting for a retrigger.")]
    pub reconnect_attempts: Option<u32>,

    #[clap(long, env = "DASHBOARD_DEMO_SEED", help = "Fixed seed for reproducible demo sessions.")]
    pub demo_seed: Option<u64>,

    #[clap(long, env = "DASHBOARD_THEME", help = "Theme to store on the backend at startup.")]
    pub theme: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            base_url: other.base_url.or(self.base_url),
            push_url: other.push_url.or(self.push_url),
            token_path: other.token_path.or(self.token_path),
            poll_interval_ms: other.poll_interval_ms.or(self.poll_interval_ms),
            reconnect_attempts: other.reconnect_attempts.or(self.reconnect_attempts),
            demo_seed: other.demo_seed.or(self.demo_seed),
            theme: other.theme.or(self.theme),
        }
    }

    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_deref().unwrap_or_else(|| Path::new("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Reads the engine config file (defaults if absent) and applies the
    /// command-line and environment overrides on top.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut engine = if path.exists() {
            EngineConfig::from_json_file(&path)
                .with_context(|| format!("Failed to load engine config from {}", path.display()))?
        } else {
            log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
            EngineConfig::default()
        };

        if let Some(url) = &self.base_url {
            engine.http.base_url = url.clone();
        }
        if let Some(url) = &self.push_url {
            engine.connection.push_url = url.clone();
        }
        if let Some(token_path) = &self.token_path {
            engine.auth.token_path = Some(token_path.display().to_string());
        }
        if let Some(ms) = self.poll_interval_ms {
            engine.connection.poll_interval_ms = ms;
        }
        if let Some(attempts) = self.reconnect_attempts {
            engine.connection.reconnect_attempts = attempts;
        }
        if let Some(seed) = self.demo_seed {
            engine.demo.seed = Some(seed);
        }
        Ok(engine)
    }
}

/// Layers the command line (which includes environment variables) over defaults.
pub fn resolve(cli: Config) -> Config {
    let default_config = Config {
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        ..Default::default()
    };
    default_config.merge(cli)
}

pub fn load_config() -> Config {
    resolve(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Config::parse_from(["dashboard_agent", "--log-level", "debug", "--demo-seed", "9"]);
        let config = resolve(cli);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_dir(), Path::new("./logs"));
        assert_eq!(config.demo_seed, Some(9));
    }

    #[test]
    fn test_engine_config_file_then_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"http": {{"baseUrl": "http://10.0.0.2:5000/"}}, "connection": {{"pollIntervalMs": 2500}}}}"#
        )
        .unwrap();

        let config = Config {
            config_path: Some(file.path().to_path_buf()),
            push_url: Some("ws://10.0.0.2:5000/socket.io/?EIO=4&transport=websocket".to_string()),
            reconnect_attempts: Some(3),
            ..Default::default()
        };
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.http.base_url, "http://10.0.0.2:5000/");
        assert_eq!(engine.connection.poll_interval_ms, 2500);
        assert_eq!(engine.connection.push_url, "ws://10.0.0.2:5000/socket.io/?EIO=4&transport=websocket");
        assert_eq!(engine.connection.reconnect_attempts, 3);
    }

    #[test]
    fn test_broken_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let config = Config { config_path: Some(file.path().to_path_buf()), ..Default::default() };
        assert!(config.engine_config().is_err());
    }
}
