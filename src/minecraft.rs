use directories::BaseDirs;
use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

pub const DEFAULT_GAME_VERSION: &str = "1.20.1";
pub const DEFAULT_LOADER: &str = "fabric";

pub fn default_minecraft_dir() -> PathBuf {
    let Some(base) = BaseDirs::new() else {
        return PathBuf::from(".minecraft");
    };
    if cfg!(target_os = "windows") {
        // data_dir() is %APPDATA% (Roaming) on Windows.
        base.data_dir().join(".minecraft")
    } else if cfg!(target_os = "macos") {
        base.data_dir().join("minecraft")
    } else {
        base.home_dir().join(".minecraft")
    }
}

pub fn mods_dir(minecraft_dir: &Path) -> PathBuf {
    minecraft_dir.join("mods")
}

pub fn looks_like_minecraft_dir(path: &Path) -> bool {
    path.is_dir()
        && (path.join("mods").is_dir()
            || path.join("versions").is_dir()
            || path.join("launcher_profiles.json").is_file())
}

/// An NVIDIA card is assumed present when `nvidia-smi` runs cleanly.
pub fn detect_nvidia_gpu() -> bool {
    Command::new("nvidia-smi")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
