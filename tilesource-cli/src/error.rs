//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;
use tilesource::config::ConfigFileError;
use tilesource::error::SourceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Archive could not be loaded
    Load(SourceError),
    /// Tile could not be loaded
    Tile(SourceError),
    /// Requested tile lies outside the archive
    OutOfBounds(String),
    /// Failed to write output file
    FileWrite { path: String, error: String },
}

impl CliError {
    /// Exit the process with an error message and non-zero code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Load(SourceError::Archive(e)) = self {
            if e.is_not_found() {
                eprintln!();
                eprintln!("Check that the archive path exists and is readable.");
            }
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Load(e) => write!(f, "Failed to load archive: {}", e),
            CliError::Tile(e) => write!(f, "Failed to load tile: {}", e),
            CliError::OutOfBounds(tile) => {
                write!(f, "Tile {} is outside the archive's bounds", tile)
            }
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Load(e) | CliError::Tile(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}
