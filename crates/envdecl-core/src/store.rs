//! Environment stores
//!
//! The loader never touches `std::env` directly. It reads and writes through
//! [`EnvStore`], so the same code drives the real process environment, an
//! in-memory map in tests, or a preview overlay that leaves its base alone.

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// A mutable name → value mapping
pub trait EnvStore {
    /// Current value of `name`, or `None` when unset
    fn get(&self, name: &str) -> Option<String>;

    /// Set `name` to `value`
    fn set(&mut self, name: &str, value: &str) -> Result<()>;
}

/// The current process's environment
///
/// Writes are process-scoped: they are visible to this process and to
/// children spawned after the write, never to the parent shell.
///
/// Values that are not valid Unicode are read lossily, with each invalid
/// sequence replaced by U+FFFD, and a warning is logged. Prefixing or
/// suffixing such a variable writes the replaced form back.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ProcessEnv {
    pub fn new() -> Self {
        Self
    }
}

impl EnvStore for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        match std::env::var_os(name)?.into_string() {
            Ok(value) => Some(value),
            Err(raw) => {
                log::warn!(
                    "{} is not valid Unicode; invalid bytes read as U+FFFD",
                    name
                );
                Some(raw.to_string_lossy().into_owned())
            }
        }
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        // std::env::set_var panics on these instead of returning an error
        if name.is_empty() {
            return Err(Error::store(name, "name is empty"));
        }
        if name.contains('=') {
            return Err(Error::store(name, "name contains '='"));
        }
        if name.contains('\0') {
            return Err(Error::store(name, "name contains a NUL byte"));
        }
        if value.contains('\0') {
            return Err(Error::store(name, "value contains a NUL byte"));
        }
        std::env::set_var(name, value);
        Ok(())
    }
}

/// An in-memory store that remembers insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    vars: IndexMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of variables held
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate variables in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl EnvStore for MemoryStore {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        self.vars.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryStore
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Pending writes layered over a read-only base store
///
/// Reads see pending writes first, then fall through to the base. Used for
/// previews, where later declarations must observe earlier ones without the
/// base ever being modified.
pub struct OverlayStore<'a, S: EnvStore + ?Sized> {
    base: &'a S,
    writes: IndexMap<String, String>,
}

impl<'a, S: EnvStore + ?Sized> OverlayStore<'a, S> {
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            writes: IndexMap::new(),
        }
    }

    /// Writes recorded so far, in first-write order
    pub fn writes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.writes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<S: EnvStore + ?Sized> EnvStore for OverlayStore<'_, S> {
    fn get(&self, name: &str) -> Option<String> {
        self.writes
            .get(name)
            .cloned()
            .or_else(|| self.base.get(name))
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        self.writes.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_store_get_set() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("HOME"), None);

        store.set("HOME", "/home/dev").unwrap();
        assert_eq!(store.get("HOME"), Some("/home/dev".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_is_case_sensitive() {
        let store: MemoryStore = [("Path", "a")].into_iter().collect();
        assert_eq!(store.get("Path"), Some("a".to_string()));
        assert_eq!(store.get("PATH"), None);
    }

    #[test]
    fn test_memory_store_keeps_insertion_order() {
        let mut store = MemoryStore::new();
        store.set("B", "2").unwrap();
        store.set("A", "1").unwrap();
        store.set("B", "3").unwrap();

        let entries: Vec<_> = store.iter().collect();
        assert_eq!(entries, vec![("B", "3"), ("A", "1")]);
    }

    #[test]
    fn test_overlay_reads_through_and_shadows() {
        let base: MemoryStore = [("A", "base"), ("B", "base")].into_iter().collect();
        let mut overlay = OverlayStore::new(&base);

        overlay.set("A", "new").unwrap();
        overlay.set("C", "added").unwrap();

        assert_eq!(overlay.get("A"), Some("new".to_string()));
        assert_eq!(overlay.get("B"), Some("base".to_string()));
        assert_eq!(overlay.get("C"), Some("added".to_string()));
        assert_eq!(
            overlay.writes().collect::<Vec<_>>(),
            vec![("A", "new"), ("C", "added")]
        );

        // Base untouched
        assert_eq!(base.get("A"), Some("base".to_string()));
        assert_eq!(base.get("C"), None);
    }

    #[test]
    fn test_process_env_round_trip() {
        let mut env = ProcessEnv::new();
        env.set("ENVDECL_STORE_TEST_ROUND_TRIP", "value with spaces")
            .unwrap();

        assert_eq!(
            env.get("ENVDECL_STORE_TEST_ROUND_TRIP"),
            Some("value with spaces".to_string())
        );
        assert_eq!(
            std::env::var("ENVDECL_STORE_TEST_ROUND_TRIP").unwrap(),
            "value with spaces"
        );

        std::env::remove_var("ENVDECL_STORE_TEST_ROUND_TRIP");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_env_non_unicode_value_is_replaced() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var(
            "ENVDECL_STORE_TEST_NON_UNICODE",
            OsStr::from_bytes(b"/opt/\xffbin"),
        );
        let env = ProcessEnv::new();
        assert_eq!(
            env.get("ENVDECL_STORE_TEST_NON_UNICODE"),
            Some("/opt/\u{FFFD}bin".to_string())
        );

        std::env::remove_var("ENVDECL_STORE_TEST_NON_UNICODE");
    }

    #[test]
    fn test_process_env_unset_is_none() {
        let env = ProcessEnv::new();
        assert_eq!(env.get("ENVDECL_STORE_TEST_NEVER_SET_4F2A"), None);
    }

    #[test]
    fn test_process_env_rejects_unrepresentable_writes() {
        let mut env = ProcessEnv::new();

        let err = env.set("", "x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Store);

        let err = env.set("A=B", "x").unwrap_err();
        assert!(err.to_string().contains("'='"));

        let err = env.set("ENVDECL_STORE_TEST_NUL", "a\0b").unwrap_err();
        assert!(err.to_string().contains("NUL"));
        assert_eq!(env.get("ENVDECL_STORE_TEST_NUL"), None);
    }
}
