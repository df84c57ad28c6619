//! Error types for envdecl
//!
//! Errors are structured: a kind, the variable being written (if any),
//! the source location of the offending line, and an actionable help message.

use std::fmt;

/// Result type alias for envdecl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for envdecl operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Variable the failing declaration was writing, if known
    pub key: Option<String>,
    /// Source location (file, line) if available
    pub source_location: Option<SourceLocation>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Location in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: Option<usize>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The declaration file does not exist
    FileNotFound { path: String },
    /// The declaration file exists but could not be read
    Io { path: String },
    /// Placeholder substitution never settled
    CircularReference,
    /// The environment store refused a write
    Store,
}

impl Error {
    /// Create a file not found error
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::FileNotFound { path: path.into() },
            key: None,
            source_location: None,
            help: Some("Create the file or point --file at an existing one".into()),
            cause: None,
        }
    }

    /// Create an I/O error for a file that exists but cannot be read
    pub fn io(path: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Io { path: path.into() },
            key: None,
            source_location: None,
            help: Some("Check the file's permissions and that it is valid UTF-8".into()),
            cause: Some(cause.to_string()),
        }
    }

    /// Create a circular reference error from the chain of substituted names
    pub fn circular_reference(chain: Vec<String>) -> Self {
        let chain_str = chain.join(" → ");
        Self {
            kind: ErrorKind::CircularReference,
            key: None,
            source_location: None,
            help: Some("Break the cycle by removing one of the ${...} references".into()),
            cause: Some(format!("Chain: {}", chain_str)),
        }
    }

    /// Create a store write error
    pub fn store(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Store,
            key: Some(key.into()),
            source_location: None,
            help: Some(
                "Variable names must be non-empty and free of '=' and NUL; values must be free of NUL"
                    .into(),
            ),
            cause: Some(message.into()),
        }
    }

    /// Add the variable name to the error
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add source location to the error
    pub fn with_source_location(mut self, loc: SourceLocation) -> Self {
        self.source_location = Some(loc);
        self
    }

    /// Add a line number, keeping any file already recorded
    pub fn with_line(mut self, line: usize) -> Self {
        match &mut self.source_location {
            Some(loc) => loc.line = Some(line),
            None => {
                self.source_location = Some(SourceLocation {
                    file: String::new(),
                    line: Some(line),
                })
            }
        }
        self
    }

    /// Add a file name, keeping any line already recorded
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        let file = file.into();
        match &mut self.source_location {
            Some(loc) => loc.file = file,
            None => self.source_location = Some(SourceLocation { file, line: None }),
        }
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// True when the error means "the file is not there" rather than a read fault
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::FileNotFound { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::FileNotFound { path } => write!(f, "File not found: {}", path)?,
            ErrorKind::Io { path } => write!(f, "Failed to read {}", path)?,
            ErrorKind::CircularReference => write!(f, "Circular reference detected")?,
            ErrorKind::Store => write!(f, "Environment write rejected")?,
        }

        if let Some(key) = &self.key {
            write!(f, "\n  Key: {}", key)?;
        }

        if let Some(loc) = &self.source_location {
            if loc.file.is_empty() {
                if let Some(line) = loc.line {
                    write!(f, "\n  Line: {}", line)?;
                }
            } else {
                write!(f, "\n  File: {}", loc.file)?;
                if let Some(line) = loc.line {
                    write!(f, ":{}", line)?;
                }
            }
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
