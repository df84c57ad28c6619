//! Reading declaration files
//!
//! The whole file is read before any line is applied. A missing optional
//! file is a no-op with a warning; any other read failure is fatal.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::loader::{Gate, LoadReport, Loader, LoaderOptions};
use crate::store::EnvStore;

/// File looked up in the working directory when no path is given
pub const DEFAULT_FILE_NAME: &str = ".env";

/// `.env` in the current working directory
pub fn default_path() -> PathBuf {
    PathBuf::from(DEFAULT_FILE_NAME)
}

/// Specifies a file to load, either required or optional
///
/// # Examples
///
/// ```ignore
/// use envdecl_core::{FileSpec, MemoryStore, LoaderOptions, ApplyAll};
///
/// let mut store = MemoryStore::new();
/// let report = envdecl_core::load_file(
///     &FileSpec::optional(".env"),  // Won't error if missing
///     &mut store,
///     LoaderOptions::default(),
///     &mut ApplyAll,
/// )?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSpec {
    /// A required file - error if not found
    Required(PathBuf),
    /// An optional file - warn and skip if not found
    Optional(PathBuf),
}

impl FileSpec {
    /// Create a required file spec
    pub fn required(path: impl Into<PathBuf>) -> Self {
        FileSpec::Required(path.into())
    }

    /// Create an optional file spec
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        FileSpec::Optional(path.into())
    }

    /// Get the path for this file spec
    pub fn path(&self) -> &Path {
        match self {
            FileSpec::Required(p) => p,
            FileSpec::Optional(p) => p,
        }
    }

    /// Check if this file spec is optional
    pub fn is_optional(&self) -> bool {
        matches!(self, FileSpec::Optional(_))
    }
}

impl Default for FileSpec {
    fn default() -> Self {
        FileSpec::Optional(default_path())
    }
}

impl<P: Into<PathBuf>> From<P> for FileSpec {
    fn from(path: P) -> Self {
        FileSpec::Required(path.into())
    }
}

/// Read every line of a declaration file
///
/// Returns `Ok(None)` when an optional file does not exist.
pub fn read_lines(spec: &FileSpec) -> Result<Option<Vec<String>>> {
    let path = spec.path();
    let display = path.display().to_string();

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if spec.is_optional() {
                log::warn!("{} not found, nothing to load", display);
                return Ok(None);
            }
            return Err(Error::file_not_found(display));
        }
        Err(e) => return Err(Error::io(display, e)),
    };

    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    log::debug!("read {} lines from {}", lines.len(), display);

    Ok(Some(lines))
}

/// Read `spec` and apply it to `store`
pub fn load_file<S, G>(
    spec: &FileSpec,
    store: &mut S,
    options: LoaderOptions,
    gate: &mut G,
) -> Result<LoadReport>
where
    S: EnvStore + ?Sized,
    G: Gate + ?Sized,
{
    let Some(lines) = read_lines(spec)? else {
        return Ok(LoadReport::missing());
    };
    let file = spec.path().display().to_string();

    let report = Loader::new(options)
        .apply(&lines, store, gate)
        .map_err(|e| e.with_file(&file))?;

    Ok(with_file(report, &file))
}

/// Read `spec` and compute its assignments without writing to `store`
pub fn preview_file<S>(spec: &FileSpec, store: &S, options: LoaderOptions) -> Result<LoadReport>
where
    S: EnvStore + ?Sized,
{
    let Some(lines) = read_lines(spec)? else {
        return Ok(LoadReport::missing());
    };
    let file = spec.path().display().to_string();

    let report = Loader::new(options)
        .preview(&lines, store)
        .map_err(|e| e.with_file(&file))?;

    Ok(with_file(report, &file))
}

fn with_file(mut report: LoadReport, file: &str) -> LoadReport {
    for failure in &mut report.failures {
        failure.error = failure.error.clone().with_file(file);
    }
    report
}
