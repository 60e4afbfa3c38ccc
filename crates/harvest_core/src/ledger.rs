use std::collections::BTreeMap;

use crate::LedgerError;

/// Lifecycle of one requested chapter: `Pending -> Fetching -> Parsed | Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterState {
    Pending,
    Fetching,
    Parsed,
    Failed(String),
}

impl ChapterState {
    fn label(&self) -> &'static str {
        match self {
            ChapterState::Pending => "pending",
            ChapterState::Fetching => "fetching",
            ChapterState::Parsed => "parsed",
            ChapterState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChapterState::Parsed | ChapterState::Failed(_))
    }
}

/// Per-index bookkeeping for one pipeline run.
///
/// Completion is judged from the recorded states, never from a bare counter:
/// a run is settled when every dispatched chapter reached a terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterLedger {
    states: BTreeMap<usize, ChapterState>,
}

impl ChapterLedger {
    pub fn new(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            states: indices
                .into_iter()
                .map(|index| (index, ChapterState::Pending))
                .collect(),
        }
    }

    pub fn begin(&mut self, index: usize) -> Result<(), LedgerError> {
        self.transition(index, ChapterState::Fetching)
    }

    pub fn mark_parsed(&mut self, index: usize) -> Result<(), LedgerError> {
        self.transition(index, ChapterState::Parsed)
    }

    pub fn mark_failed(&mut self, index: usize, reason: impl Into<String>) -> Result<(), LedgerError> {
        self.transition(index, ChapterState::Failed(reason.into()))
    }

    fn transition(&mut self, index: usize, next: ChapterState) -> Result<(), LedgerError> {
        let current = self
            .states
            .get_mut(&index)
            .ok_or(LedgerError::UnknownIndex(index))?;
        let allowed = matches!(
            (&*current, &next),
            (ChapterState::Pending, ChapterState::Fetching)
                | (ChapterState::Fetching, ChapterState::Parsed)
                | (ChapterState::Fetching, ChapterState::Failed(_))
        );
        if !allowed {
            return Err(LedgerError::IllegalTransition {
                index,
                from: current.label(),
                to: next.label(),
            });
        }
        *current = next;
        Ok(())
    }

    pub fn state(&self, index: usize) -> Option<&ChapterState> {
        self.states.get(&index)
    }

    pub fn requested(&self) -> usize {
        self.states.len()
    }

    pub fn requested_indices(&self) -> Vec<usize> {
        self.states.keys().copied().collect()
    }

    pub fn dispatched(&self) -> usize {
        self.states
            .values()
            .filter(|state| **state != ChapterState::Pending)
            .count()
    }

    pub fn settled(&self) -> usize {
        self.states.values().filter(|state| state.is_terminal()).count()
    }

    pub fn parsed(&self) -> usize {
        self.states
            .values()
            .filter(|state| **state == ChapterState::Parsed)
            .count()
    }

    pub fn failures(&self) -> Vec<(usize, String)> {
        self.states
            .iter()
            .filter_map(|(index, state)| match state {
                ChapterState::Failed(reason) => Some((*index, reason.clone())),
                _ => None,
            })
            .collect()
    }

    /// Chapters that were dispatched but never reached a terminal state.
    pub fn in_flight(&self) -> Vec<usize> {
        self.indices_in(&ChapterState::Fetching)
    }

    pub fn pending(&self) -> Vec<usize> {
        self.indices_in(&ChapterState::Pending)
    }

    fn indices_in(&self, wanted: &ChapterState) -> Vec<usize> {
        self.states
            .iter()
            .filter(|(_, state)| *state == wanted)
            .map(|(index, _)| *index)
            .collect()
    }

    pub fn is_settled(&self) -> bool {
        self.dispatched() == self.settled()
    }

    pub fn is_complete(&self) -> bool {
        self.settled() == self.requested()
    }
}
