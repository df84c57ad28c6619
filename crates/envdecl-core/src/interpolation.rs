//! Placeholder resolution
//!
//! Replaces `${NAME}` with the current value of `NAME` in an [`EnvStore`],
//! repeating until no placeholder is left:
//! - `${HOME}/bin` - simple reference
//! - `${A}${B}` - several references, resolved leftmost first
//! - `${OUTER}` where `OUTER=${INNER}` - chained references
//! - `${UNSET}` - unset names resolve to the empty string
//! - `${` with no closing `}` - kept literally
//!
//! Substituted values are scanned again, so a reference cycle would never
//! settle. Resolution remembers every intermediate string and caps how deep
//! substitutions nest; tripping either guard is a circular reference.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::store::EnvStore;

/// Default cap on nested substitutions for a single value
pub const DEFAULT_MAX_ROUNDS: usize = 100;

const OPEN: &str = "${";
const CLOSE: char = '}';

/// A `${NAME}` occurrence within a string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Byte offset of the `$`
    pub start: usize,
    /// Byte offset just past the closing `}`
    pub end: usize,
    /// Everything between the braces, unvalidated
    pub name: &'a str,
}

/// Find the leftmost complete placeholder in `input`
pub fn find_placeholder(input: &str) -> Option<Placeholder<'_>> {
    let start = input.find(OPEN)?;
    let name_start = start + OPEN.len();
    // If the first `${` has no `}` after it, no later one can either
    let name_len = input[name_start..].find(CLOSE)?;
    let name_end = name_start + name_len;

    Some(Placeholder {
        start,
        end: name_end + CLOSE.len_utf8(),
        name: &input[name_start..name_end],
    })
}

/// Check if a string contains a resolvable placeholder
pub fn contains_placeholder(input: &str) -> bool {
    find_placeholder(input).is_some()
}

/// Repeat-until-stable placeholder substitution against a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolver {
    max_rounds: usize,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap how deep substitutions may nest for a single value
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Resolve every placeholder in `input`
    ///
    /// Text inserted by a substitution sits one level deeper than the
    /// placeholder it replaced, and `max_rounds` bounds that depth. Sibling
    /// placeholders do not count against it, however many there are.
    ///
    /// # Errors
    ///
    /// Returns a `CircularReference` error if an intermediate string repeats
    /// or nesting goes deeper than `max_rounds`.
    pub fn resolve<S: EnvStore + ?Sized>(&self, input: &str, store: &S) -> Result<String> {
        let mut current = input.to_string();
        // Nesting depth of every byte in `current`
        let mut depths: Vec<usize> = vec![0; current.len()];
        let mut seen: HashSet<String> = HashSet::new();
        let mut chain = Chain::default();

        loop {
            let (start, end, name) = match find_placeholder(&current) {
                Some(p) => (p.start, p.end, p.name.to_string()),
                None => return Ok(current),
            };

            // `$` and `{` may come from different substitutions
            let depth = depths[start].max(depths[start + 1]);
            if depth > self.max_rounds {
                log::debug!(
                    "gave up after {} nested substitutions on {:?}",
                    self.max_rounds,
                    input
                );
                chain.push(name);
                return Err(Error::circular_reference(chain.into_names()).with_help(format!(
                    "Placeholders were still being produced after {} nested substitutions; break the cycle or raise --max-rounds",
                    self.max_rounds
                )));
            }

            if !seen.insert(current.clone()) {
                chain.push(name);
                return Err(Error::circular_reference(chain.into_names()));
            }

            let value = store.get(&name).unwrap_or_default();
            log::trace!("depth {}: ${{{}}} -> {:?}", depth, name, value);

            current.replace_range(start..end, &value);
            depths.splice(start..end, std::iter::repeat(depth + 1).take(value.len()));
            chain.push(name);
        }
    }
}

/// Names substituted so far, closed at the first repeated name
#[derive(Debug, Default)]
struct Chain {
    names: Vec<String>,
    closed: bool,
}

impl Chain {
    fn push(&mut self, name: String) {
        if self.closed {
            return;
        }
        self.closed = self.names.contains(&name);
        self.names.push(name);
    }

    fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Resolve `input` with the default round cap
pub fn resolve<S: EnvStore + ?Sized>(input: &str, store: &S) -> Result<String> {
    Resolver::default().resolve(input, store)
}
