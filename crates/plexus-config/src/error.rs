//! Error types for settings and documents.

use std::path::PathBuf;

use plexus_core::GraphError;
use thiserror::Error;

/// Errors from loading, saving or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Malformed XML
    #[error("failed to parse XML: {0}")]
    XmlParse(#[from] roxmltree::Error),

    /// A node state that is not valid base64
    #[error("invalid state encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Well-formed XML that is not a graph document
    #[error("invalid graph document: {0}")]
    InvalidDocument(String),

    /// A setting outside its allowed range
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Setting name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The restored graph could not be compiled
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn read_file_display_names_path() {
        let err = ConfigError::read_file("/a/b.toml", mock_io_err());
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/a/b.toml"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::invalid("block_size", "must be non-zero");
        assert_eq!(err.to_string(), "invalid value for 'block_size': must be non-zero");
    }

    #[test]
    fn graph_error_converts() {
        let err: ConfigError = GraphError::CycleDetected.into();
        assert!(matches!(err, ConfigError::Graph(GraphError::CycleDetected)));
    }
}
