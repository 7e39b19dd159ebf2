//! Notification-keyed session tracking.
//!
//! Platform glue reports media notifications by key; the registry remembers
//! which key owns which session while the listener is connected and turns
//! posts/removals into lifecycle signals. Posts and removals that arrive
//! while disconnected, or removals for keys never seen, are ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{IconHint, MediaHandle, NowPlaying, PlaybackPhase};

/// A media notification as seen by the platform listener
#[derive(Clone)]
pub struct Candidate {
    pub key: String,
    pub handle: MediaHandle,
    pub icon: Option<IconHint>,
}

pub struct SessionRegistry {
    now_playing: Arc<NowPlaying>,
    connected: AtomicBool,
    sessions: Mutex<HashMap<String, MediaHandle>>,
}

impl SessionRegistry {
    pub fn new(now_playing: Arc<NowPlaying>) -> Self {
        Self {
            now_playing,
            connected: AtomicBool::new(false),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, MediaHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now_playing(&self) -> &Arc<NowPlaying> {
        &self.now_playing
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_tracked(&self, key: &str) -> bool {
        self.sessions().contains_key(key)
    }

    /// Listener came up: start on the best of the notifications already
    /// showing.
    pub fn on_listener_connected(&self, candidates: Vec<Candidate>) -> std::io::Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("[Registry] Listener connected");

        match select_preferred(candidates) {
            Some(c) => self.post(c),
            None => Ok(()),
        }
    }

    pub fn on_listener_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.sessions().clear();
        tracing::warn!("[Registry] Listener disconnected");
    }

    pub fn on_notification_posted(
        &self,
        key: &str,
        handle: MediaHandle,
        icon: Option<IconHint>,
    ) -> std::io::Result<()> {
        if !self.is_connected() {
            tracing::warn!("[Registry] Notification posted but listener not connected");
            return Ok(());
        }
        self.post(Candidate {
            key: key.to_string(),
            handle,
            icon,
        })
    }

    pub fn on_notification_removed(&self, key: &str) {
        if !self.is_connected() {
            return;
        }
        let removed = self.sessions().remove(key);
        if let Some(handle) = removed {
            tracing::debug!("[Registry] Session {} removed", key);
            self.now_playing.on_media_removed(&handle);
        }
    }

    /// On-demand refresh of the current track. Only answered while
    /// connected.
    pub fn request_update(&self) -> bool {
        if !self.is_connected() {
            tracing::warn!("[Registry] Not connected yet, cannot fulfill update request");
            return false;
        }
        self.now_playing.request_update()
    }

    fn post(&self, candidate: Candidate) -> std::io::Result<()> {
        self.sessions()
            .insert(candidate.key, Arc::clone(&candidate.handle));
        self.now_playing
            .on_media_appeared(candidate.handle, candidate.icon)
    }
}

/// Pick the session worth following: the last playing one, else the last
/// paused one. Sessions in any other state, or that fail to report one,
/// are passed over.
pub fn select_preferred(candidates: Vec<Candidate>) -> Option<Candidate> {
    let mut playing = None;
    let mut paused = None;

    for candidate in candidates {
        let phase = match candidate.handle.playback_status() {
            Ok(status) => PlaybackPhase::from_raw(status.state),
            Err(e) => {
                tracing::debug!("[Registry] Skipping {}: {}", candidate.key, e);
                continue;
            }
        };
        match phase {
            PlaybackPhase::Playing => playing = Some(candidate),
            PlaybackPhase::Paused => paused = Some(candidate),
            _ => {}
        }
    }

    playing.or(paused)
}
