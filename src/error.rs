use std::{fmt, io, path::StripPrefixError};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ThaloError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Invalid change marker '{0}': expected \"git:<commit>\" or \"ts:<ISO-8601>\"")]
    InvalidMarker(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    /// Files holding entries selected for change tracking have uncommitted changes. Commit them,
    /// or rerun with `force` to accept the working-tree state.
    #[error("Uncommitted changes in {} file(s): {}", files.len(), files.join(", "))]
    UncommittedChanges { files: Vec<String> },
    #[error("Version control error: {0}")]
    Vcs(String),
}

impl ThaloError {
    /// The offending file list for [`ThaloError::UncommittedChanges`].
    pub fn uncommitted_files(&self) -> Option<&[String]> {
        match self {
            ThaloError::UncommittedChanges { files } => Some(files),
            _ => None,
        }
    }
}

impl From<StripPrefixError> for ThaloError {
    fn from(src: StripPrefixError) -> ThaloError {
        ThaloError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for ThaloError {
    fn from(src: toml::de::Error) -> ThaloError {
        ThaloError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for ThaloError {
    fn from(src: toml::ser::Error) -> ThaloError {
        ThaloError::Config(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for ThaloError {
    fn from(src: JsonError) -> ThaloError {
        ThaloError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for ThaloError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => ThaloError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => ThaloError::PermissionDenied,
            _ => ThaloError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for ThaloError {
    fn from(x: walkdir::Error) -> Self {
        match x.into_io_error() {
            Some(io_error) => ThaloError::from(io_error),
            None => ThaloError::Io("directory walk failed (filesystem loop)".to_string()),
        }
    }
}

impl From<fmt::Error> for ThaloError {
    fn from(x: fmt::Error) -> Self {
        ThaloError::Custom(format!("{x}"))
    }
}

impl From<std::string::FromUtf8Error> for ThaloError {
    fn from(x: std::string::FromUtf8Error) -> Self {
        ThaloError::Vcs(format!("non UTF-8 output: {x}"))
    }
}
