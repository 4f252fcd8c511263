pub mod ask;
pub mod gateway;
pub mod onboard;

use std::path::PathBuf;

/// Filesystem path behind a SQLite connection string, if it has one.
pub fn database_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = rest.split('?').next().unwrap_or(rest);

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// Create the database's parent directory so SQLite can create the file.
pub fn ensure_database_dir(url: &str) -> std::io::Result<()> {
    if let Some(parent) = database_path(url).as_deref().and_then(|p| p.parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
