use std::path::PathBuf;

/// Errors that can occur across csmap.
///
/// Extraction, ranking, and report generation never return these for
/// per-file problems; they degrade and log instead. Only plumbing (reading
/// configuration, walking a missing root, persisting output) surfaces them.
///
/// # Examples
///
/// ```
/// use csmap_core::CsmapError;
///
/// let err = CsmapError::Config("alpha must be in (0, 1)".into());
/// assert!(err.to_string().contains("alpha"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CsmapError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(help("check .repomap/config.toml or run `csmap init --force`"))]
    Config(String),

    /// Git metadata lookup failure.
    #[error("git error: {0}")]
    Git(String),

    /// Source code parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failure.
    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    /// A required file or directory was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(help("set [source] root_path in .repomap/config.toml"))]
    FileNotFound(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CsmapError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = CsmapError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = CsmapError::FileNotFound(PathBuf::from("/tmp/Assets/Scripts"));
        assert!(err.to_string().contains("/tmp/Assets/Scripts"));
    }

    #[test]
    fn toml_error_converts() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: CsmapError = toml_err.into();
        assert!(err.to_string().starts_with("TOML parse error"));
    }
}
