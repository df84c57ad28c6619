//! envdecl-core: load environment declarations into a store
//!
//! This crate parses `NAME=VALUE`, `NAME:=VALUE` (prefix) and `NAME=:VALUE`
//! (suffix) declarations, resolves `${NAME}` placeholders against the live
//! environment, and writes the results line by line.
//!
//! # Example
//!
//! ```rust
//! use envdecl_core::{ApplyAll, EnvStore, Loader, MemoryStore};
//!
//! let mut store: MemoryStore = [("PATH", "/usr/bin")].into_iter().collect();
//! let lines = [
//!     "# project tools",
//!     "ROOT=/srv/app",
//!     "PATH:=${ROOT}/bin  # first on the path",
//! ];
//!
//! Loader::default().apply(lines, &mut store, &mut ApplyAll).unwrap();
//! assert_eq!(store.get("PATH").as_deref(), Some("/srv/app/bin;/usr/bin"));
//! ```

pub mod declaration;
pub mod error;
pub mod interpolation;
pub mod loader;
pub mod source;
pub mod store;

pub use declaration::{Declaration, Operator};
pub use error::{Error, ErrorKind, Result};
pub use interpolation::Resolver;
pub use loader::{
    ApplyAll, Assignment, Gate, LineFailure, LoadReport, Loader, LoaderOptions, Separator,
};
pub use source::{default_path, load_file, preview_file, read_lines, FileSpec};
pub use store::{EnvStore, MemoryStore, OverlayStore, ProcessEnv};
