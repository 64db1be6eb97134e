use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use support::constants::HTTPFILE_UPLOAD_TMP_DIR;
use tracing::debug;

use crate::errors::SettingsError;

fn default_tmp_dir() -> PathBuf {
    std::env::var_os(HTTPFILE_UPLOAD_TMP_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Settings of the host upload registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Directory receiving staged uploads.
    #[serde(default = "default_tmp_dir")]
    tmp_dir: PathBuf,

    /// Largest accepted upload in bytes, unlimited when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_file_size: Option<u64>,
}

impl UploadSettings {
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    /// Loads settings from a TOML file; `HTTPFILE_UPLOAD_TMP_DIR` still wins
    /// over the file's `tmp_dir`.
    pub fn load_from_toml(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut settings: UploadSettings = toml::from_str(&content)?;

        if let Some(tmp_dir) = std::env::var_os(HTTPFILE_UPLOAD_TMP_DIR) {
            debug!("{} overrides tmp_dir", HTTPFILE_UPLOAD_TMP_DIR);
            settings.tmp_dir = tmp_dir.into();
        }

        Ok(settings)
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        UploadSettingsBuilder::new().build()
    }
}

#[derive(Debug)]
pub struct UploadSettingsBuilder {
    config: UploadSettings,
}

impl Default for UploadSettingsBuilder {
    fn default() -> Self {
        Self {
            config: UploadSettings {
                tmp_dir: default_tmp_dir(),
                max_file_size: None,
            },
        }
    }
}

impl UploadSettingsBuilder {
    pub fn new() -> UploadSettingsBuilder {
        Self::default()
    }

    fn transition(config: UploadSettings) -> Self {
        Self { config }
    }

    pub fn with_tmp_dir(self, tmp_dir: impl Into<PathBuf>) -> Self {
        Self::transition(UploadSettings {
            tmp_dir: tmp_dir.into(),
            ..self.config
        })
    }

    pub fn with_max_file_size(self, max_file_size: u64) -> Self {
        Self::transition(UploadSettings {
            max_file_size: Some(max_file_size),
            ..self.config
        })
    }

    pub fn build(self) -> UploadSettings {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn upload_settings_builder_should_build_new_settings_correctly() {
        let settings = UploadSettingsBuilder::new()
            .with_tmp_dir("/var/tmp/uploads")
            .with_max_file_size(1024)
            .build();

        assert_eq!(settings.tmp_dir(), Path::new("/var/tmp/uploads"));
        assert_eq!(settings.max_file_size(), Some(1024));
    }

    #[test]
    fn upload_settings_builder_should_default_to_no_size_limit() {
        let settings = UploadSettingsBuilder::new().build();

        assert_eq!(settings.max_file_size(), None);
    }

    #[test]
    fn load_from_toml_should_read_the_settings_file() {
        let path = format!("/tmp/unit_test_{}.toml", Uuid::new_v4());
        std::fs::write(&path, "max_file_size = 2097152\n").unwrap();

        let settings = UploadSettings::load_from_toml(&path).unwrap();

        assert_eq!(settings.max_file_size(), Some(2_097_152));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn load_from_toml_should_fail_on_invalid_content() {
        let path = format!("/tmp/unit_test_{}.toml", Uuid::new_v4());
        std::fs::write(&path, "max_file_size = \"big\"\n").unwrap();

        let err = UploadSettings::load_from_toml(&path).unwrap_err();

        assert!(matches!(err, SettingsError::Toml(_)));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn load_from_toml_should_fail_on_missing_file() {
        let err = UploadSettings::load_from_toml("/tmp/does/not/exist.toml").unwrap_err();

        assert!(matches!(err, SettingsError::Io(_)));
    }
}
