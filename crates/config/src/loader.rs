use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result, env_subst::substitute_env, schema::FeedbridgeConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "feedbridge.toml",
    "feedbridge.yaml",
    "feedbridge.yml",
    "feedbridge.json",
];

const APP_NAME: &str = "feedbridge";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<FeedbridgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./feedbridge.{toml,yaml,yml,json}`
/// 2. `<user config dir>/feedbridge/feedbridge.{toml,yaml,yml,json}`
///
/// Falls back to `FeedbridgeConfig::default()` when nothing is found or the
/// file does not parse; validation then reports what is missing.
pub fn discover_and_load() -> FeedbridgeConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    FeedbridgeConfig::default()
}

pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// User-global config directory (`~/.config/feedbridge/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.config_dir().to_path_buf())
}

/// Default home for credentials, the thread cache and watermarks.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<FeedbridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        _ => Err(Error::UnsupportedFormat {
            ext: ext.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("feedbridge.toml");
        std::fs::write(&toml_path, "[source]\nclient_id = \"t\"\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().source.client_id, "t");

        let yaml_path = dir.path().join("feedbridge.yaml");
        std::fs::write(&yaml_path, "relay:\n  limit: 20\n").unwrap();
        assert_eq!(load_config(&yaml_path).unwrap().relay.limit, Some(20));

        let json_path = dir.path().join("feedbridge.json");
        std::fs::write(&json_path, r#"{"destination": {"api_base": "http://x"}}"#).unwrap();
        assert_eq!(load_config(&json_path).unwrap().destination.api_base, "http://x");
    }

    #[test]
    fn substitutes_env_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedbridge.toml");
        std::fs::write(
            &path,
            "[destination]\ntoken = \"${FEEDBRIDGE_LOADER_TEST_UNSET:-xoxb-fallback}\"\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(
            cfg.destination.token.unwrap().expose_secret(),
            "xoxb-fallback"
        );
    }

    #[test]
    fn reports_parse_and_format_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("feedbridge.toml");
        std::fs::write(&bad, "[source\n").unwrap();
        assert!(matches!(load_config(&bad), Err(Error::Parse { .. })));

        let ini = dir.path().join("feedbridge.ini");
        std::fs::write(&ini, "").unwrap();
        assert!(matches!(load_config(&ini), Err(Error::UnsupportedFormat { .. })));

        assert!(matches!(
            load_config(&dir.path().join("absent.toml")),
            Err(Error::Read { .. })
        ));
    }
}
