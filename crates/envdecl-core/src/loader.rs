//! Applying declaration lines to a store
//!
//! [`Loader`] walks lines in order. For each declaration it resolves the
//! value, composes it with the variable's current value, hands the result to
//! a [`Gate`], and writes it if the gate agrees. Each write is visible to the
//! lines after it.

use serde::Serialize;

use crate::declaration::{classify, Declaration, Line, Operator};
use crate::error::{Error, Result};
use crate::interpolation::{Resolver, DEFAULT_MAX_ROUNDS};
use crate::store::{EnvStore, OverlayStore};

/// Joins a prefix or suffix to the existing value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Separator(String);

impl Default for Separator {
    fn default() -> Self {
        Self(";".to_string())
    }
}

impl Separator {
    pub fn new(separator: impl Into<String>) -> Self {
        Self(separator.into())
    }

    /// The host's path-list separator: `;` on Windows, `:` elsewhere
    pub fn platform() -> Self {
        if cfg!(windows) {
            Self::new(";")
        } else {
            Self::new(":")
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Separator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Separator {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Options controlling how declarations are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Separator for prefix/suffix composition
    pub separator: Separator,
    /// Nesting cap per value before declaring a circular reference
    pub max_rounds: usize,
    /// Abort the whole run on the first failing line instead of skipping it
    pub fail_fast: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            separator: Separator::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            fail_fast: false,
        }
    }
}

impl LoaderOptions {
    pub fn with_separator(mut self, separator: impl Into<Separator>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// A computed write, ready to be committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    /// 1-based line number in the source
    pub line: usize,
    pub key: String,
    pub operator: Operator,
    /// Final value, fully resolved and composed
    pub value: String,
}

/// Decides whether a computed assignment is written
pub trait Gate {
    fn should_apply(&mut self, assignment: &Assignment) -> bool;
}

impl<F> Gate for F
where
    F: FnMut(&Assignment) -> bool,
{
    fn should_apply(&mut self, assignment: &Assignment) -> bool {
        self(assignment)
    }
}

/// Gate that applies everything
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyAll;

impl Gate for ApplyAll {
    fn should_apply(&mut self, _assignment: &Assignment) -> bool {
        true
    }
}

/// A line that failed without stopping the run
#[derive(Debug, Clone)]
pub struct LineFailure {
    pub line: usize,
    pub error: Error,
}

/// Outcome of a run
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Assignments written, in line order
    pub applied: Vec<Assignment>,
    /// Assignments the gate turned down
    pub declined: Vec<Assignment>,
    /// Line numbers of non-comment lines with no operator
    pub ignored: Vec<usize>,
    pub failures: Vec<LineFailure>,
    /// The source was optional and absent
    pub file_missing: bool,
}

impl LoadReport {
    /// Report for an optional source that does not exist
    pub fn missing() -> Self {
        Self {
            file_missing: true,
            ..Self::default()
        }
    }

    /// True when no line failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resolves, composes and writes declarations
#[derive(Debug, Clone, Default)]
pub struct Loader {
    options: LoaderOptions,
    resolver: Resolver,
}

impl Loader {
    pub fn new(options: LoaderOptions) -> Self {
        let resolver = Resolver::new().with_max_rounds(options.max_rounds);
        Self { options, resolver }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Compute the write for one declaration against the store's current state
    pub fn assignment<S: EnvStore + ?Sized>(
        &self,
        decl: &Declaration,
        line: usize,
        store: &S,
    ) -> Result<Assignment> {
        let resolved = self
            .resolver
            .resolve(&decl.raw_value, store)
            .map_err(|e| e.with_key(&decl.key).with_line(line))?;

        let previous = match decl.operator {
            Operator::Assign => None,
            Operator::Prefix | Operator::Suffix => store.get(&decl.key),
        };

        let value = decl.operator.compose(
            &resolved,
            previous.as_deref(),
            self.options.separator.as_str(),
        );

        Ok(Assignment {
            line,
            key: decl.key.clone(),
            operator: decl.operator,
            value,
        })
    }

    /// Apply lines to `store`, asking `gate` before every write
    ///
    /// # Errors
    ///
    /// Only with `fail_fast`: the first failing line aborts the run. Writes
    /// made by earlier lines stay in place.
    pub fn apply<I, L, S, G>(&self, lines: I, store: &mut S, gate: &mut G) -> Result<LoadReport>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
        S: EnvStore + ?Sized,
        G: Gate + ?Sized,
    {
        let mut report = LoadReport::default();

        for (idx, raw) in lines.into_iter().enumerate() {
            let line = idx + 1;

            let decl = match classify(raw.as_ref()) {
                Line::Blank | Line::Comment => continue,
                Line::Unrecognized(text) => {
                    log::debug!("line {}: no operator in {:?}, ignoring", line, text);
                    report.ignored.push(line);
                    continue;
                }
                Line::Declaration(decl) => decl,
            };

            let assignment = match self.assignment(&decl, line, &*store) {
                Ok(a) => a,
                Err(e) => {
                    self.record_failure(&mut report, line, e)?;
                    continue;
                }
            };

            if !gate.should_apply(&assignment) {
                log::debug!("line {}: {} declined", line, assignment.key);
                report.declined.push(assignment);
                continue;
            }

            if let Err(e) = store.set(&assignment.key, &assignment.value) {
                self.record_failure(&mut report, line, e.with_line(line))?;
                continue;
            }

            log::debug!(
                "line {}: {} {} -> {:?}",
                line,
                assignment.operator,
                assignment.key,
                assignment.value
            );
            report.applied.push(assignment);
        }

        Ok(report)
    }

    /// Compute every assignment without touching `store`
    ///
    /// Writes land in an overlay, so later lines still see earlier ones.
    pub fn preview<I, L, S>(&self, lines: I, store: &S) -> Result<LoadReport>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
        S: EnvStore + ?Sized,
    {
        let mut overlay = OverlayStore::new(store);
        self.apply(lines, &mut overlay, &mut ApplyAll)
    }

    fn record_failure(&self, report: &mut LoadReport, line: usize, error: Error) -> Result<()> {
        if self.options.fail_fast {
            return Err(error);
        }
        log::warn!("skipping line {}: {}", line, error);
        report.failures.push(LineFailure { line, error });
        Ok(())
    }
}
