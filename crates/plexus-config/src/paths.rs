//! Platform-specific locations for settings and saved graphs.
//!
//! - **Config**: `~/.config/plexus/` (Linux), `~/Library/Application Support/plexus/` (macOS), `%APPDATA%\plexus\` (Windows)
//! - **Graphs**: `graphs/` under the config directory

use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "plexus";

/// Subdirectory for saved graph documents.
const GRAPHS_SUBDIR: &str = "graphs";

/// Engine settings file name.
const CONFIG_FILE: &str = "engine.toml";

/// Extension of graph documents.
pub const GRAPH_EXTENSION: &str = "xml";

/// The user's configuration directory. Falls back to `.` when the platform
/// has none.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Where [`EngineConfig`](crate::EngineConfig) is read from by default.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

/// The user's saved graphs.
pub fn user_graphs_dir() -> PathBuf {
    user_config_dir().join(GRAPHS_SUBDIR)
}

/// Creates the user graphs directory if needed.
pub fn ensure_user_graphs_dir() -> Result<PathBuf, ConfigError> {
    ensure_dir(user_graphs_dir())
}

/// Creates the user config directory if needed.
pub fn ensure_user_config_dir() -> Result<PathBuf, ConfigError> {
    ensure_dir(user_config_dir())
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf, ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Resolves a graph by path, or by name inside the user graphs directory
/// (the `.xml` extension may be omitted).
pub fn find_graph(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }
    let filename = if name.ends_with(".xml") {
        name.to_string()
    } else {
        format!("{name}.{GRAPH_EXTENSION}")
    };
    let user_path = user_graphs_dir().join(filename);
    user_path.is_file().then_some(user_path)
}

/// Graph documents in `dir`, sorted by path. Empty if `dir` cannot be read.
pub fn list_graphs_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut graphs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == GRAPH_EXTENSION))
        .collect();
    graphs.sort();
    graphs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_dirs_use_app_name() {
        assert!(user_config_dir().to_string_lossy().contains("plexus"));
        assert!(default_config_path().ends_with("engine.toml"));
        assert!(user_graphs_dir().starts_with(user_config_dir()));
    }

    #[test]
    fn test_find_graph_by_path() {
        let temp_dir = TempDir::new().unwrap();
        let graph = temp_dir.path().join("live.xml");
        fs::write(&graph, "<graph/>").unwrap();
        assert_eq!(find_graph(graph.to_str().unwrap()), Some(graph));
    }

    #[test]
    fn test_find_graph_missing() {
        assert!(find_graph("nonexistent_graph_12345").is_none());
    }

    #[test]
    fn test_list_graphs_in() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.xml"), "").unwrap();
        fs::write(temp_dir.path().join("a.xml"), "").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "").unwrap();

        let graphs = list_graphs_in(temp_dir.path());
        let names: Vec<_> = graphs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.xml", "b.xml"]);
    }

    #[test]
    fn test_list_graphs_missing_dir() {
        assert!(list_graphs_in(Path::new("/nonexistent/path/12345")).is_empty());
    }
}
