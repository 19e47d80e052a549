//! Configuration and input error types

use thiserror::Error;

/// Errors raised while loading configuration or operator-supplied input files.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let config_err = Error::Config("chunk_size must be between 1 and 100".into());
        assert_eq!(
            config_err.to_string(),
            "Configuration error: chunk_size must be between 1 and 100"
        );

        let io_err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "ids.json not found",
        ));
        assert!(
            io_err.to_string().starts_with("I/O error:"),
            "got: {}",
            io_err
        );
    }

    #[test]
    fn json_errors_convert() {
        let parse: std::result::Result<Vec<String>, _> = serde_json::from_str("[1, ");
        let err: Error = parse.unwrap_err().into();
        assert!(
            matches!(err, Error::Json(_)),
            "serde_json errors must map to Json, got: {err:?}"
        );
        assert!(err.to_string().starts_with("JSON parse error:"));
    }
}
