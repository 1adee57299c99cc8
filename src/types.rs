//! Shared primitive ids and field paths.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Position of an entry in the action list.
pub type ActionIndex = usize;
/// Position of an event in the event log.
pub type EventIndex = usize;
/// Monotonic journal record sequence number.
pub type JournalSeq = u64;

/// One step from a field to one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathStep {
    /// Field of an aggregate, by declaration order.
    Field(usize),
    /// Element of a fixed array or dynamic sequence.
    Index(usize),
}

/// Location of a field or element inside a tracked aggregate.
///
/// Paths are ordered lexicographically, so every path sorts directly before
/// the paths it prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathStep>);

impl Path {
    /// The aggregate root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns true for the aggregate root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Steps from the root.
    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    /// Number of steps from the root.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the aggregate root.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new path extended by `step`.
    pub fn child(&self, step: PathStep) -> Self {
        let mut steps = Vec::with_capacity(self.0.len() + 1);
        steps.extend_from_slice(&self.0);
        steps.push(step);
        Self(steps)
    }

    /// Returns a new path for element `index` of this path.
    pub fn element(&self, index: usize) -> Self {
        self.child(PathStep::Index(index))
    }

    /// Returns true when `self` equals `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Replaces the step at `depth`, keeping everything else.
    pub(crate) fn with_step(&self, depth: usize, step: PathStep) -> Self {
        let mut steps = self.0.clone();
        steps[depth] = step;
        Self(steps)
    }

    pub(crate) fn push(&mut self, step: PathStep) {
        self.0.push(step);
    }
}

impl From<Vec<PathStep>> for Path {
    fn from(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for step in &self.0 {
            match step {
                PathStep::Field(index) => write!(f, ".{index}")?,
                PathStep::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Wall-clock milliseconds since the Unix epoch; zero if the clock reads
/// before it.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(saturating_ms)
        .unwrap_or(0)
}

fn saturating_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
