use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{MediaSession, PlaybackStatus, RawPlaybackState, TrackMetadata};
use crate::error::MediaError;

/// In-process media session.
///
/// Stands in for a platform provider: the harness binary drives it from the
/// keyboard, tests script it. Playback states can be queued with
/// [`SimulatedSession::script`]; each status read consumes one entry
/// (`None` meaning "unavailable") and the last entry sticks once the queue
/// runs dry.
pub struct SimulatedSession {
    source: String,
    inner: Mutex<Inner>,
}

struct Inner {
    metadata: Option<TrackMetadata>,
    state: Option<RawPlaybackState>,
    position_ms: i64,
    script: VecDeque<Option<RawPlaybackState>>,
    failures: u32,
    status_reads: u64,
}

impl SimulatedSession {
    pub fn new(source: &str, metadata: TrackMetadata, state: RawPlaybackState) -> Self {
        Self {
            source: source.to_string(),
            inner: Mutex::new(Inner {
                metadata: Some(metadata),
                state: Some(state),
                position_ms: 0,
                script: VecDeque::new(),
                failures: 0,
                status_reads: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_metadata(&self, metadata: TrackMetadata) {
        self.lock().metadata = Some(metadata);
    }

    pub fn set_metadata_unavailable(&self) {
        self.lock().metadata = None;
    }

    pub fn set_state(&self, state: RawPlaybackState) {
        let mut inner = self.lock();
        inner.script.clear();
        inner.state = Some(state);
    }

    pub fn set_status_unavailable(&self) {
        let mut inner = self.lock();
        inner.script.clear();
        inner.state = None;
    }

    pub fn set_position(&self, position_ms: i64) {
        self.lock().position_ms = position_ms;
    }

    /// Queue playback states for upcoming status reads.
    pub fn script(&self, states: impl IntoIterator<Item = Option<RawPlaybackState>>) {
        self.lock().script.extend(states);
    }

    /// Make the next `count` metadata reads fail with a backend error.
    pub fn fail_next_reads(&self, count: u32) {
        self.lock().failures = count;
    }

    pub fn status_reads(&self) -> u64 {
        self.lock().status_reads
    }
}

impl MediaSession for SimulatedSession {
    fn metadata(&self) -> Result<TrackMetadata, MediaError> {
        let mut inner = self.lock();
        if inner.failures > 0 {
            inner.failures -= 1;
            return Err(MediaError::Backend("simulated read failure".into()));
        }
        inner.metadata.clone().ok_or(MediaError::Unavailable("metadata"))
    }

    fn playback_status(&self) -> Result<PlaybackStatus, MediaError> {
        let mut inner = self.lock();
        inner.status_reads += 1;
        if let Some(next) = inner.script.pop_front() {
            inner.state = next;
        }
        let state = inner.state.ok_or(MediaError::Unavailable("playback state"))?;
        Ok(PlaybackStatus {
            state,
            position_ms: inner.position_ms,
        })
    }

    fn source_package(&self) -> String {
        self.source.clone()
    }
}
