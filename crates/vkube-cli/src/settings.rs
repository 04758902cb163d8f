use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "VKUBE_CONFIG";

/// User defaults from `~/.config/vkube/config.toml`. Command-line flags
/// override these; these override built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub graphics: Option<bool>,
    pub acceleration: Option<bool>,
    /// Whether `start` blocks until interrupted when `--wait` is not given.
    pub wait: Option<bool>,
}

impl Settings {
    /// Load from `$VKUBE_CONFIG` if set (the file must exist), otherwise
    /// from the default path if present.
    pub fn load_default() -> Result<Self, String> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&explicit));
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| format!("failed to parse config {}: {e}", path.display()))
    }
}

fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".config/vkube/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn values_are_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "graphics = true\nacceleration = false\nwait = false\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.graphics, Some(true));
        assert_eq!(settings.acceleration, Some(false));
        assert_eq!(settings.wait, Some(false));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "grafics = true\n").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(err.starts_with("failed to parse config"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.starts_with("failed to read config"));
    }
}
