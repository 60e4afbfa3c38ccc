use std::sync::mpsc;

use harvest_core::{ChapterRange, ImageDescriptor, RunPhase};

use crate::runner::{ImageRunReport, TextRunOutcome};

/// Everything the engine reports while working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Phase(RunPhase),
    ChaptersResolved {
        total: usize,
        range: ChapterRange,
    },
    /// `completed` counts parsed and failed chapters alike.
    ChapterProgress {
        completed: usize,
        total: usize,
    },
    ChapterDone {
        index: usize,
        name: String,
        chars: usize,
    },
    ChapterFailed {
        index: usize,
        reason: String,
    },
    ImagesFound(Vec<ImageDescriptor>),
    LinksRemaining(usize),
    TextRunFinished(Result<TextRunOutcome, String>),
    ImageRunFinished(Result<ImageRunReport, String>),
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}
