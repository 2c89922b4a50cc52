use crate::{AppConfig, HostDiffError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "hostdiff.toml";
const CACHE_FILE_NAME: &str = "hosting_assets.bin";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    pub exists: bool,
    pub portable: bool,
}

pub fn load_config(prefer_portable: bool) -> Result<LoadedConfig, HostDiffError> {
    let (path, portable) = resolve_config_path(prefer_portable)?;
    load_config_from(path, portable)
}

/// Load configuration from an explicit file. A missing file yields defaults.
pub fn load_config_from(path: PathBuf, portable: bool) -> Result<LoadedConfig, HostDiffError> {
    let exists = path.exists();

    let mut config = if exists {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data).map_err(|e| HostDiffError::Serialization(e.to_string()))?
    } else {
        AppConfig::default()
    };

    config.portable_mode = portable;

    Ok(LoadedConfig {
        config,
        path,
        exists,
        portable,
    })
}

pub fn ensure_config(prefer_portable: bool) -> Result<LoadedConfig, HostDiffError> {
    let loaded = load_config(prefer_portable)?;
    if !loaded.exists {
        save_config(&loaded.path, &loaded.config)?;
    }
    Ok(loaded)
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), HostDiffError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = toml::to_string_pretty(config)
        .map_err(|e| HostDiffError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

pub fn default_cache_dir(portable: bool, config_path: &Path) -> Result<PathBuf, HostDiffError> {
    if portable {
        let base = config_path
            .parent()
            .map(|path| path.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        return Ok(base.join("hostdiff_cache"));
    }

    let dirs = ProjectDirs::from("", "hostdiff", "hostdiff")
        .ok_or_else(|| HostDiffError::Config("Unable to determine cache directory".to_string()))?;
    Ok(dirs.cache_dir().to_path_buf())
}

/// Asset cache file of `profile` under `cache_dir`.
///
/// Profile names become a directory component, so separators and
/// relative components are rejected.
pub fn profile_cache_file(cache_dir: &Path, profile: &str) -> Result<PathBuf, HostDiffError> {
    let valid = !profile.is_empty()
        && profile != "."
        && profile != ".."
        && !profile.contains('/')
        && !profile.contains('\\');
    if !valid {
        return Err(HostDiffError::Config(format!("Invalid profile name: '{}'", profile)));
    }
    Ok(cache_dir.join(profile).join(CACHE_FILE_NAME))
}

fn resolve_config_path(prefer_portable: bool) -> Result<(PathBuf, bool), HostDiffError> {
    if let Some(portable_path) = portable_config_path() {
        if prefer_portable || portable_path.exists() {
            return Ok((portable_path, true));
        }
    }

    let dirs = ProjectDirs::from("", "hostdiff", "hostdiff")
        .ok_or_else(|| HostDiffError::Config("Unable to determine config directory".to_string()))?;
    Ok((dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

fn portable_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
}
