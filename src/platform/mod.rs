// tabkeeper platform paths
// Resolves where the settings database lives on each OS.
//
// Uses `cfg(target_os)` to select the platform convention at compile time.

use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "tabkeeper";

/// Returns the platform-specific data directory for tabkeeper.
///
/// - **Linux**: `$XDG_DATA_HOME/tabkeeper` or `~/.local/share/tabkeeper`
/// - **macOS**: `~/Library/Application Support/tabkeeper`
/// - **Windows**: `%APPDATA%/tabkeeper`
pub fn get_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA")
            .unwrap_or_else(|_| String::from("C:\\Users\\Default\\AppData\\Roaming"));
        PathBuf::from(appdata).join(APP_DIR)
    }
    #[cfg(target_os = "macos")]
    {
        home_dir()
            .join("Library")
            .join("Application Support")
            .join(APP_DIR)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        match env::var("XDG_DATA_HOME") {
            Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join(APP_DIR),
            _ => home_dir().join(".local").join("share").join(APP_DIR),
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn home_dir() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
}

/// Path of the settings database inside `dir`.
pub fn database_path(dir: &std::path::Path) -> PathBuf {
    dir.join("tabkeeper.db")
}
