//! Client configuration and script files.
//!
//! The config is a TOML file whose location is chosen by the caller (the CLI
//! takes `--config`).  A missing file is not an error: the defaults apply.
//! Scripts are plain UTF-8 text files; the title is the file stem.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;

use crate::domain::config::ClientConfig;
use crate::domain::settings::Script;

/// Errors reading or writing client files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File-system failure other than "not found" for the config file.
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Loads the config at `path`, or the defaults if it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a script from a text file.
pub fn load_script(path: &Path) -> Result<Script, ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    let content = std::fs::read_to_string(path).map_err(io_err)?;
    let updated_at = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());

    Ok(Script {
        id: path.display().to_string(),
        title: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        content,
        updated_at,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("lumo_test_{}", Uuid::new_v4()))
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        // Arrange
        let path = temp_dir().join("missing.toml");

        // Act
        let cfg = load_config(&path).expect("absent file is not an error");

        // Assert
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("nested").join("client.toml");
        let mut cfg = ClientConfig::default();
        cfg.relay.url = "ws://10.1.1.1:10000".to_string();
        cfg.playback.mirror_vertical = true;

        // Act
        save_config(&path, &cfg).expect("save");
        let loaded = load_config(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("client.toml");
        std::fs::write(&path, "frame_rate = \"fast\"").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_load_script_uses_file_stem_as_title() {
        // Arrange
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Opening Remarks.txt");
        std::fs::write(&path, "Good evening.\n\nWelcome.").unwrap();

        // Act
        let script = load_script(&path).expect("load");

        // Assert
        assert_eq!(script.title, "Opening Remarks");
        assert_eq!(script.content, "Good evening.\n\nWelcome.");
        assert!(script.updated_at > 0);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_load_missing_script_is_io_error() {
        let result = load_script(&temp_dir().join("nope.txt"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
