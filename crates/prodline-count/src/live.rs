use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Most recently published per-class counts, or the sentinel before the
/// first successful counting update of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CountSnapshot {
    #[default]
    Unknown,
    Counts(HashMap<i32, u64>),
}

impl CountSnapshot {
    /// Produced quantity for a class; Unknown reads as zero.
    pub fn produced(&self, class_id: i32) -> u64 {
        match self {
            CountSnapshot::Unknown => 0,
            CountSnapshot::Counts(m) => m.get(&class_id).copied().unwrap_or(0),
        }
    }

    /// Poll-facing display form: "None" until the first update.
    pub fn display_for(&self, class_id: i32) -> String {
        match self {
            CountSnapshot::Unknown => "None".to_string(),
            CountSnapshot::Counts(m) => m.get(&class_id).copied().unwrap_or(0).to_string(),
        }
    }
}

/// Single-writer, many-reader live count register. The frame loop replaces
/// the snapshot wholesale; any consumer clones the current value, so reads
/// are stale-but-consistent and never torn.
#[derive(Debug, Clone, Default)]
pub struct LiveCounts {
    inner: Arc<Mutex<CountSnapshot>>,
}

impl LiveCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, counts: HashMap<i32, u64>) {
        *self.inner.lock().unwrap() = CountSnapshot::Counts(counts);
    }

    /// Back to the Unknown sentinel; called at every session start.
    pub fn reset(&self) {
        *self.inner.lock().unwrap() = CountSnapshot::Unknown;
    }

    pub fn snapshot(&self) -> CountSnapshot {
        self.inner.lock().unwrap().clone()
    }
}
