//! Configuration file loading.
//!
//! A neon configuration is a structured document with four top-level
//! sections — `store`, `fetcher`, `loader`, `server` — each decoded into
//! the corresponding subsystem's configuration map. Unknown keys inside a
//! section pass through to modules untouched.
//!
//! The file extension selects the parser: `.yaml`/`.yml`, `.toml` or
//! `.json`. All formats normalize to [`serde_json::Value`] so the rest of
//! the system is format-agnostic.

use std::path::Path;

use serde_json::{Map, Value};

/// Environment variable naming the configuration file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Configuration file used when [`CONFIG_FILE_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "neon.yaml";

/// Error raised while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("read config file '{path}': {source}")]
    Read {
        /// The offending path.
        path: String,
        /// The underlying I/O failure.
        source: std::io::Error,
    },

    /// The file extension maps to no known parser.
    #[error("unsupported config format '{0}': expected .yaml, .toml or .json")]
    UnknownFormat(String),

    /// The document could not be parsed.
    #[error("parse config: {0}")]
    Parse(String),

    /// The document's top level is not a mapping.
    #[error("config top level must be a mapping")]
    NotAMapping,

    /// A top-level section is present but is not a mapping.
    #[error("config section '{0}' must be a mapping")]
    SectionNotAMapping(String),
}

/// The decoded configuration, split per subsystem.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// The `store` section.
    pub store: Map<String, Value>,
    /// The `fetcher` section.
    pub fetcher: Map<String, Value>,
    /// The `loader` section.
    pub loader: Map<String, Value>,
    /// The `server` section.
    pub server: Map<String, Value>,
}

impl Config {
    /// Loads the configuration from the file named by `CONFIG_FILE`, or
    /// from `neon.yaml` when unset.
    ///
    /// # Errors
    ///
    /// See [`Config::from_file`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(Path::new(&path))
    }

    /// Loads and decodes a configuration file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file is unreadable, the extension
    /// is unknown, the document fails to parse or the shape is wrong.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        tracing::debug!(path = %path.display(), format, "loading config");
        Self::parse(&content, format)
    }

    /// Decodes a configuration document from a string.
    ///
    /// `format` is the file extension without the dot.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] on an unknown format, a parse failure or
    /// a non-mapping document.
    pub fn parse(content: &str, format: &str) -> Result<Self, ConfigError> {
        let document: Value = match format {
            "yaml" | "yml" => serde_yaml::from_str(content)
                .map_err(|err| ConfigError::Parse(err.to_string()))?,
            "toml" => {
                toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?
            }
            "json" => serde_json::from_str(content)
                .map_err(|err| ConfigError::Parse(err.to_string()))?,
            other => return Err(ConfigError::UnknownFormat(format!(".{other}"))),
        };

        let Value::Object(mut sections) = document else {
            return Err(ConfigError::NotAMapping);
        };

        Ok(Self {
            store: take_section(&mut sections, "store")?,
            fetcher: take_section(&mut sections, "fetcher")?,
            loader: take_section(&mut sections, "loader")?,
            server: take_section(&mut sections, "server")?,
        })
    }
}

/// Removes a section from the document; a missing section decodes to an
/// empty map so subsystem validation reports the real problem.
fn take_section(
    sections: &mut Map<String, Value>,
    name: &str,
) -> Result<Map<String, Value>, ConfigError> {
    match sections.remove(name) {
        Some(Value::Object(map)) => Ok(map),
        Some(Value::Null) | None => Ok(Map::new()),
        Some(_) => Err(ConfigError::SectionNotAMapping(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
store:
  storage:
    memory: {}
server:
  listeners:
    default:
      tcp:
        address: 127.0.0.1
        port: 8080
  sites:
    main:
      listeners: [default]
      routes:
        /:
          handler:
            text:
              body: ok
"#;

    #[test]
    fn yaml_splits_into_sections() {
        let config = Config::parse(YAML, "yaml").unwrap();
        assert!(config.store.contains_key("storage"));
        assert!(config.server.contains_key("listeners"));
        assert!(config.fetcher.is_empty());
        assert!(config.loader.is_empty());
    }

    #[test]
    fn toml_and_json_decode_to_the_same_shape() {
        let toml_doc = r#"
[store.storage.memory]

[server.listeners.default.tcp]
address = "127.0.0.1"
port = 8080
"#;
        let json_doc = r#"{
  "store": {"storage": {"memory": {}}},
  "server": {"listeners": {"default": {"tcp": {"address": "127.0.0.1", "port": 8080}}}}
}"#;

        let from_toml = Config::parse(toml_doc, "toml").unwrap();
        let from_json = Config::parse(json_doc, "json").unwrap();
        assert_eq!(
            Value::Object(from_toml.server),
            Value::Object(from_json.server)
        );
    }

    #[test]
    fn unknown_keys_pass_through() {
        let config = Config::parse("loader:\n  execWorkers: 4\n  custom: x\n", "yaml").unwrap();
        assert_eq!(config.loader["custom"], Value::String("x".to_string()));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = Config::parse("{}", "ini").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFormat(_)));
    }

    #[test]
    fn scalar_top_level_is_rejected() {
        let err = Config::parse("42", "yaml").unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping));
    }

    #[test]
    fn scalar_section_is_rejected() {
        let err = Config::parse("store: 3\n", "yaml").unwrap_err();
        assert!(matches!(err, ConfigError::SectionNotAMapping(_)));
    }
}
