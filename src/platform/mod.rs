use std::path::{Path, PathBuf};

use is_terminal::IsTerminal;

#[cfg(unix)]
mod unix;

/// Get the current user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Per-user data directory for wpdev (`~/.local/share/wpdev` on Linux).
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("wpdev")
}

/// Per-user cache directory for wpdev (`~/.cache/wpdev` on Linux).
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("wpdev")
}

/// Expand leading `~` or `$HOME` in a path string to the actual home directory.
///
/// Returns the original string unchanged when no home directory is available
/// or the string doesn't start with `~` or `$HOME`.
pub fn expand_home(path: &str) -> String {
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        let home = home.to_string_lossy();
        if path == "~" || path == "$HOME" {
            return home.to_string();
        }
        if let Some(rest) = path.strip_prefix("~/") {
            return format!("{}/{}", home, rest);
        }
        if let Some(rest) = path.strip_prefix("$HOME/") {
            return format!("{}/{}", home, rest);
        }
    }
    path.to_string()
}

/// True when both stdin and stdout are attached to a terminal.
pub fn stdio_is_terminal() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// True when `path` is a unix socket the current user can read and write.
///
/// Always false on platforms without unix sockets.
pub fn is_usable_socket(path: &Path) -> bool {
    #[cfg(unix)]
    {
        unix::is_usable_socket(path)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        false
    }
}
