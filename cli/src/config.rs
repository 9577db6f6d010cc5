use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_CONFIG_PATH: &str = "VIBESYNC_CONFIG_PATH";
const ENV_BACKEND_URL: &str = "VIBESYNC_BACKEND_URL";
const ENV_DOWNLOAD_DIR: &str = "VIBESYNC_DOWNLOAD_DIR";
const ENV_USER_ID: &str = "VIBESYNC_USER_ID";
const ENV_AUDIO_PREVIEW: &str = "VIBESYNC_AUDIO_PREVIEW";
const ENV_FFPROBE: &str = "VIBESYNC_FFPROBE";

#[derive(Debug, Clone)]
pub struct AppConfig {
    backend_url: Option<String>,
    download_dir: PathBuf,
    user_id: Option<String>,
    audio_preview: bool,
    ffprobe_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let path = match config_file_override() {
            Some(path) => path,
            None => Self::default_config_path()?,
        };
        if path.exists() {
            let partial = read_partial(&path)?;
            config.apply_partial(partial);
        }

        config.apply_env()?;
        Ok(config)
    }

    pub fn backend_url(&self) -> Option<&str> {
        self.backend_url.as_deref()
    }

    pub fn download_dir(&self) -> &PathBuf {
        &self.download_dir
    }

    pub fn preview_dir(&self) -> PathBuf {
        self.download_dir.join("previews")
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn audio_preview(&self) -> bool {
        self.audio_preview
    }

    pub fn ffprobe_path(&self) -> Option<&PathBuf> {
        self.ffprobe_path.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn with_download_dir(download_dir: PathBuf) -> Self {
        Self { download_dir, audio_preview: false, ..Self::default() }
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "VibeSync", "VibeSync")
            .ok_or_else(|| anyhow!("unable to determine config directory"))?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(url) = partial.backend_url {
            self.backend_url = Some(url);
        }
        if let Some(dir) = partial.download_dir {
            self.download_dir = dir;
        }
        if let Some(user_id) = partial.user_id {
            self.user_id = Some(user_id);
        }
        if let Some(enabled) = partial.audio_preview {
            self.audio_preview = enabled;
        }
        if let Some(path) = partial.ffprobe_path {
            self.ffprobe_path = Some(path);
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = env::var(ENV_BACKEND_URL) {
            if value.trim().is_empty() {
                self.backend_url = None;
            } else {
                self.backend_url = Some(value);
            }
        }
        if let Ok(value) = env::var(ENV_DOWNLOAD_DIR) {
            if !value.trim().is_empty() {
                self.download_dir = PathBuf::from(value);
            }
        }
        if let Ok(value) = env::var(ENV_USER_ID) {
            self.user_id = Some(value);
        }
        if let Ok(value) = env::var(ENV_AUDIO_PREVIEW) {
            if !value.trim().is_empty() {
                self.audio_preview = parse_flag(&value)
                    .with_context(|| format!("{ENV_AUDIO_PREVIEW} must be true or false"))?;
            }
        }
        if let Ok(value) = env::var(ENV_FFPROBE) {
            if !value.trim().is_empty() {
                self.ffprobe_path = Some(PathBuf::from(value));
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            download_dir: default_download_dir(),
            user_id: None,
            audio_preview: true,
            ffprobe_path: None,
        }
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("unrecognised flag value {other:?}")),
    }
}

fn config_file_override() -> Option<PathBuf> {
    let value = env::var_os(ENV_CONFIG_PATH)?;
    if value.is_empty() {
        return None;
    }
    let path = PathBuf::from(value);
    if path.is_dir() {
        return Some(path.join(CONFIG_FILE_NAME));
    }
    Some(path)
}

fn read_partial(path: &Path) -> Result<PartialConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    parse_partial(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_partial(contents: &str) -> Result<PartialConfig> {
    Ok(toml::from_str(contents)?)
}

fn default_download_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join("Movies").join("VibeSync"))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PartialConfig {
    backend_url: Option<String>,
    download_dir: Option<PathBuf>,
    user_id: Option<String>,
    audio_preview: Option<bool>,
    ffprobe_path: Option<PathBuf>,
}
