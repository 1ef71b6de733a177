//! Error types for rawbuf
//!
//! The hot paths (checksums, pool accounting, block bookkeeping) never fail.
//! Errors only surface at the edges: configuration, name parsing and the
//! storage strategies that have to ask the OS for memory.

use thiserror::Error;

/// Result type alias for rawbuf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rawbuf
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (file mappings, anonymous mappings, config files)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A pool name that does not match any known pool
    #[error("Unknown memory pool: {name}")]
    UnknownPool { name: String },

    /// A CRC kernel name that does not match any known kernel
    #[error("Unknown crc32c kernel: {name}")]
    UnknownKernel { name: String },

    /// Requested block alignment is zero or not a power of two
    #[error("Invalid alignment: {align}")]
    InvalidAlignment { align: usize },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: format!("TOML parse error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_context() {
        let err = Error::io(
            "mapping file",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "I/O error: mapping file");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_toml_error_becomes_config() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("= nope");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Config { .. }));
    }
}
