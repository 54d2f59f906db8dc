//! Default filesystem locations for sysblockd
//!
//! Nothing here needs root:
//! - Socket: `$XDG_RUNTIME_DIR/sysblockd/sysblockd.sock`,
//!   else `/tmp/sysblockd-$USER/sysblockd.sock`
//! - Data: `$XDG_DATA_HOME/sysblockd`, else `~/.local/share/sysblockd`
//! - Settings: `$XDG_CONFIG_HOME/sysblock/sysblockd.toml`, else `~/.config/sysblock/sysblockd.toml`

use std::path::PathBuf;

const DAEMON_DIR: &str = "sysblockd";
const CONFIG_DIR: &str = "sysblock";
const SOCKET_FILENAME: &str = "sysblockd.sock";
const SETTINGS_FILENAME: &str = "sysblockd.toml";
const STORE_FILENAME: &str = "sysblock.db";

fn home_subdir(parts: &[&str]) -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let mut path = PathBuf::from(home);
    for part in parts {
        path.push(part);
    }
    Some(path)
}

/// Socket path from the XDG runtime dir. `$SYSBLOCK_SOCKET` is applied on
/// top by the daemon's CLI.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir)
            .join(DAEMON_DIR)
            .join(SOCKET_FILENAME);
    }

    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", DAEMON_DIR, user)).join(SOCKET_FILENAME)
}

pub fn default_data_dir() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(DAEMON_DIR);
    }

    home_subdir(&[".local", "share", DAEMON_DIR])
        .unwrap_or_else(|| PathBuf::from("/tmp").join(DAEMON_DIR).join("data"))
}

/// SQLite database file inside a data directory
pub fn store_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(STORE_FILENAME)
}

/// Default location of the daemon settings file
pub fn default_settings_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home)
            .join(CONFIG_DIR)
            .join(SETTINGS_FILENAME);
    }

    home_subdir(&[".config", CONFIG_DIR, SETTINGS_FILENAME])
        .unwrap_or_else(|| PathBuf::from("/etc").join(CONFIG_DIR).join(SETTINGS_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_names_the_daemon() {
        let path = default_socket_path();
        let text = path.to_string_lossy();
        assert!(text.contains("sysblockd"));
        assert!(text.ends_with(".sock"));
    }

    #[test]
    fn data_dir_names_the_daemon() {
        assert!(default_data_dir().to_string_lossy().contains("sysblockd"));
    }

    #[test]
    fn store_lives_in_data_dir() {
        let dir = PathBuf::from("/var/lib/sysblockd");
        assert_eq!(store_path(&dir), dir.join("sysblock.db"));
    }

    #[test]
    fn settings_file_is_toml() {
        let path = default_settings_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
    }
}
