//! # Configuration Module
//!
//! Handles loading apiprobe configuration from `apiprobe.toml` and
//! `APIPROBE_*` environment variables.
//!
//! ## Configuration Loading Flow (block diagram)
//!
//! ```text
//! +-------------------+     +-------------------+     +-------------------+
//! | .env (optional)   | --> | APIPROBE_CONFIG   | --> | apiprobe.toml     |
//! |                   |     | or default ./     |     | (optional)        |
//! +-------------------+     +-------------------+     +-------------------+
//!                                                              |
//!                                                              v
//! +-------------------+     +-------------------+     +-------------------+
//! | Environment vars  | --> | APIPROBE_<KEY>    | --> | Config struct     |
//! | APIPROBE_KEY=val  |     | overrides file    |     | (typed)           |
//! +-------------------+     +-------------------+     +-------------------+
//! ```
//!
//! ## Config File
//!
//! ```toml
//! base_url = "http://localhost"
//! base_path = "/python-api/basics/13"
//! order_id = 1
//! custom_header = "AnyValue123"
//! pacing = "200ms"
//! timeout = "30s"
//! token_fallback = "abort"
//! ```
//!
//! Every key can be overridden with `APIPROBE_<KEY>`, e.g.
//! `APIPROBE_BASE_URL=http://127.0.0.1:8080`.
//!
//! **Note:** `APIPROBE_CONFIG` is reserved for the config file path.

use serde::Deserialize;
use std::{io::Read, path::Path, time::Duration};
use toml::{Table, Value as TomlValue};
use tracing::*;
use url::Url;

use crate::{Error, Result};

/// Environment variable name for specifying the config file path.
pub const CONFIG_ENV: &str = "APIPROBE_CONFIG";

const ENV_PREFIX: &str = "APIPROBE_";

const DEFAULT_CONFIG_FILE: &str = "apiprobe.toml";

/// What to do when a scenario needs a token and none could be obtained.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TokenFallback {
    /// Record the scenario as failed without sending it.
    #[default]
    Abort,
    /// Send the request with an empty token in place of the missing one.
    Empty,
}

/// apiprobe's configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scheme and authority of the target server.
    pub base_url: String,
    /// Path prefix every endpoint lives under.
    pub base_path: String,
    /// Order id used by the `?id=` scenarios.
    pub order_id: u32,
    /// Value sent in `Custom-Header` by the order scenarios that carry it.
    pub custom_header: String,
    /// Delay between scenarios during a bulk run.
    #[serde(with = "humantime_serde")]
    pub pacing: Duration,
    /// Per-request timeout. No timeout when unset.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub token_fallback: TokenFallback,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: "http://localhost".to_string(),
            base_path: "/python-api/basics/13".to_string(),
            order_id: 1,
            custom_header: "AnyValue123".to_string(),
            pacing: Duration::from_millis(200),
            timeout: None,
            token_fallback: TokenFallback::Abort,
        }
    }
}

impl Config {
    /// Load apiprobe configuration.
    ///
    /// Loading order:
    /// 1. `.env` in the current directory, if any
    /// 2. If `APIPROBE_CONFIG` env var is set, load from that path
    /// 3. Otherwise, load from `apiprobe.toml` in the current directory
    /// 4. Overlay `APIPROBE_<KEY>` environment variables
    pub fn load() -> Result<Config> {
        let _ = dotenv::dotenv();

        let table = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let path = Path::new(&path);

                // Detect misuse: if it doesn't look like a file path, error out
                if path.extension().is_none_or(|ext| ext != "toml")
                    && !path.to_string_lossy().contains(std::path::MAIN_SEPARATOR)
                    && !path.to_string_lossy().contains('/')
                {
                    return Err(Error::LoadError(format!(
                        "{CONFIG_ENV} should be a path to a config file, not a config value. \
                         Got: {path:?}. Use APIPROBE_<KEY>=value for config values instead."
                    )));
                }

                if !path.exists() {
                    return Err(Error::LoadError(format!(
                        "config file specified by {CONFIG_ENV} not found: {path:?}"
                    )));
                }

                debug!("Loading config from {CONFIG_ENV}={path:?}");
                read_table(path)?
            }
            Err(_) => read_table(Path::new(DEFAULT_CONFIG_FILE))?,
        };

        Config::from_table(table, std::env::vars())
    }

    /// Load configuration from `path` without consulting the environment.
    pub fn load_from(path: &Path) -> Result<Config> {
        Config::from_table(read_table(path)?, std::iter::empty())
    }

    /// Build the configuration from a parsed file table and a set of
    /// environment variables. Only `APIPROBE_`-prefixed variables are used.
    pub fn from_table(
        mut table: Table,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Config> {
        for (key, value) in vars {
            if key == CONFIG_ENV {
                continue;
            }
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let name = name.to_lowercase();
            debug!("config override from env: {name}");
            let value = env_value(&name, value)?;
            table.insert(name, value);
        }

        let cfg = Config::deserialize(TomlValue::Table(table))
            .map_err(|e| Error::LoadError(format!("failed to deserialize config: {e}")))?;
        cfg.api_root()?;

        debug!("configuration loaded: {cfg:#?}");
        Ok(cfg)
    }

    /// Root URL every endpoint is joined onto, i.e. `base_url` + `base_path`.
    pub fn api_root(&self) -> Result<Url> {
        let raw = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.base_path.trim_matches('/')
        );
        Url::parse(raw.trim_end_matches('/')).map_err(|e| Error::ValueError {
            key: "base_url".into(),
            reason: e.to_string(),
        })
    }
}

fn read_table(path: &Path) -> Result<Table> {
    let Ok(mut file) = std::fs::File::open(path) else {
        debug!("{path:?} not found, using defaults");
        return Ok(Table::new());
    };

    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .map_err(|e| Error::LoadError(e.to_string()))?;

    toml::from_str(&buf).map_err(|e| Error::LoadError(format!("failed to parse {path:?}: {e}")))
}

/// Environment values are always strings; numeric keys have to be converted
/// before deserialization.
fn env_value(key: &str, value: String) -> Result<TomlValue> {
    match key {
        "order_id" => value
            .parse::<i64>()
            .map(TomlValue::Integer)
            .map_err(|e| Error::ValueError {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        _ => Ok(TomlValue::String(value)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use test_case::test_case;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_config(contents: &str) -> eyre::Result<std::path::PathBuf> {
        let dir = std::env::temp_dir().join(format!("apiprobe-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.toml", contents.len()));
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    #[test]
    fn defaults() -> eyre::Result<()> {
        let cfg = Config::from_table(Table::new(), vec![])?;
        assert_eq!(cfg, Config::default());
        assert_eq!(
            cfg.api_root()?.as_str(),
            "http://localhost/python-api/basics/13"
        );
        Ok(())
    }

    #[test]
    fn load_from_file() -> eyre::Result<()> {
        let path = write_config(
            r#"
base_url = "http://127.0.0.1:8080/"
base_path = "/api/"
order_id = 7
pacing = "0s"
timeout = "5s"
token_fallback = "empty"
"#,
        )?;
        let cfg = Config::load_from(&path)?;
        assert_eq!(cfg.order_id, 7);
        assert_eq!(cfg.pacing, Duration::ZERO);
        assert_eq!(cfg.timeout, Some(Duration::from_secs(5)));
        assert_eq!(cfg.token_fallback, TokenFallback::Empty);
        assert_eq!(cfg.custom_header, "AnyValue123");
        assert_eq!(cfg.api_root()?.as_str(), "http://127.0.0.1:8080/api");
        Ok(())
    }

    #[test]
    fn missing_file_means_defaults() -> eyre::Result<()> {
        let cfg = Config::load_from(Path::new("/nonexistent/apiprobe.toml"))?;
        assert_eq!(cfg, Config::default());
        Ok(())
    }

    #[test_case("APIPROBE_BASE_URL", "http://example.test"; "base url")]
    #[test_case("APIPROBE_CUSTOM_HEADER", "12345"; "numeric looking string")]
    fn env_overrides_string(key: &str, value: &str) -> eyre::Result<()> {
        let cfg = Config::from_table(Table::new(), vars(&[(key, value)]))?;
        let name = key.trim_start_matches(ENV_PREFIX).to_lowercase();
        let actual = match name.as_str() {
            "base_url" => cfg.base_url,
            _ => cfg.custom_header,
        };
        assert_eq!(actual, value);
        Ok(())
    }

    #[test]
    fn env_overrides_typed_values() -> eyre::Result<()> {
        let mut table = Table::new();
        table.insert("order_id".into(), TomlValue::Integer(3));
        let cfg = Config::from_table(
            table,
            vars(&[
                ("APIPROBE_ORDER_ID", "42"),
                ("APIPROBE_PACING", "1s"),
                ("APIPROBE_TOKEN_FALLBACK", "empty"),
                ("UNRELATED", "x"),
            ]),
        )?;
        assert_eq!(cfg.order_id, 42);
        assert_eq!(cfg.pacing, Duration::from_secs(1));
        assert_eq!(cfg.token_fallback, TokenFallback::Empty);
        Ok(())
    }

    #[test]
    fn invalid_order_id_is_rejected() {
        let err = Config::from_table(Table::new(), vars(&[("APIPROBE_ORDER_ID", "abc")]))
            .unwrap_err();
        assert!(matches!(err, Error::ValueError { .. }), "{err}");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = Config::from_table(Table::new(), vars(&[("APIPROBE_BASE_URL", "not a url")]))
            .unwrap_err();
        assert!(err.to_string().contains("base_url"), "{err}");
    }

    mod config_env {
        use super::super::{Config, CONFIG_ENV};
        use serial_test::serial;
        use test_case::test_case;

        #[test]
        #[serial]
        fn error_when_file_not_found() {
            std::env::set_var(CONFIG_ENV, "/nonexistent/path/apiprobe.toml");
            let result = Config::load();
            std::env::remove_var(CONFIG_ENV);

            let err = result.unwrap_err().to_string();
            assert!(err.contains("not found"), "error should mention file not found: {err}");
        }

        #[test_case("true"; "boolean value")]
        #[test_case("123"; "numeric value")]
        #[test_case("some_value"; "string value")]
        #[serial]
        fn error_when_value_looks_like_config_value(value: &str) {
            std::env::set_var(CONFIG_ENV, value);
            let result = Config::load();
            std::env::remove_var(CONFIG_ENV);

            let err = result.unwrap_err().to_string();
            assert!(err.contains("should be a path"), "error should guide user: {err}");
        }
    }

    #[test]
    #[serial]
    fn load_reads_file_from_config_env() -> eyre::Result<()> {
        let path = write_config("order_id = 9\n")?;
        std::env::set_var(CONFIG_ENV, &path);
        let result = Config::load();
        std::env::remove_var(CONFIG_ENV);

        assert_eq!(result?.order_id, 9);
        Ok(())
    }
}
