//! Session lifecycle: keeps exactly one sampling loop alive for the session
//! that appeared last, and tells the consumer when the track it shows goes
//! away.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    extract, EventSink, IconHint, LoopState, MediaHandle, PollerSettings, PollingLoop,
    TrackSnapshot,
};

#[derive(Clone)]
struct ActiveSession {
    handle: MediaHandle,
    icon: Option<IconHint>,
}

pub struct NowPlaying {
    sink: Arc<EventSink>,
    settings: PollerSettings,
    poller: Mutex<Option<PollingLoop>>,
    active: Mutex<Option<ActiveSession>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NowPlaying {
    pub fn new(sink: EventSink, settings: PollerSettings) -> Self {
        Self {
            sink: Arc::new(sink),
            settings,
            poller: Mutex::new(None),
            active: Mutex::new(None),
        }
    }

    /// A media session appeared (or changed): replace whatever loop is
    /// running with one polling `handle`.
    pub fn on_media_appeared(
        &self,
        handle: MediaHandle,
        icon: Option<IconHint>,
    ) -> std::io::Result<()> {
        let mut poller = lock(&self.poller);
        self.stop_locked(&mut poller);

        *lock(&self.active) = Some(ActiveSession {
            handle: Arc::clone(&handle),
            icon: icon.clone(),
        });

        tracing::info!("[Lifecycle] Media appeared from {}", handle.source_package());
        *poller = Some(PollingLoop::spawn(
            handle,
            icon,
            Arc::clone(&self.sink),
            self.settings,
        )?);
        Ok(())
    }

    /// A media session went away: stop polling and, if the consumer is
    /// still showing this session's track, clear it.
    pub fn on_media_removed(&self, handle: &MediaHandle) {
        self.stop_loop();

        {
            let mut active = lock(&self.active);
            if active.as_ref().is_some_and(|a| Arc::ptr_eq(&a.handle, handle)) {
                *active = None;
            }
        }

        match handle.metadata() {
            Ok(meta) => {
                let id = meta.identity();
                if self.sink.clear_if_current(&id) {
                    tracing::info!("[Lifecycle] Cleared {} after removal", id);
                }
            }
            Err(e) => {
                // Keep the display rather than clearing on a bad read
                tracing::debug!("[Lifecycle] Could not read removed session: {}", e);
            }
        }
    }

    /// Stop the running loop, if any.
    pub fn stop_loop(&self) {
        let mut poller = lock(&self.poller);
        self.stop_locked(&mut poller);
    }

    fn stop_locked(&self, poller: &mut Option<PollingLoop>) {
        if let Some(mut running) = poller.take() {
            tracing::debug!("[Lifecycle] Stopping polling thread");
            running.stop(self.settings.stop_timeout);
        }
    }

    /// Sample the most recently seen session once and emit the result.
    ///
    /// Independent of the loop: its counters are left alone. Returns whether
    /// a snapshot was emitted.
    pub fn request_update(&self) -> bool {
        let Some(active) = lock(&self.active).clone() else {
            tracing::debug!("[Lifecycle] No session to update from");
            return false;
        };

        let last_sent = self.sink.last_identity();
        match extract(active.handle.as_ref(), last_sent.as_ref(), active.icon.as_ref()) {
            Some(snapshot) => {
                self.sink.emit(snapshot);
                true
            }
            None => false,
        }
    }

    /// What the consumer was last told
    pub fn current_track(&self) -> Option<TrackSnapshot> {
        self.sink.current()
    }

    pub fn loop_state(&self) -> LoopState {
        lock(&self.poller)
            .as_ref()
            .map_or(LoopState::Idle, PollingLoop::state)
    }

    pub fn has_session(&self) -> bool {
        lock(&self.active).is_some()
    }
}

impl Drop for NowPlaying {
    fn drop(&mut self) {
        self.stop_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::simulated::SimulatedSession;
    use crate::media::{
        PlaybackPhase, RawPlaybackState, TrackEvent, TrackIdentity, TrackMetadata,
    };
    use crossbeam_channel::{unbounded, Receiver};
    use std::time::Duration;

    fn meta(title: &str, artist: &str, album: &str) -> TrackMetadata {
        TrackMetadata {
            title: Some(title.into()),
            artist: Some(artist.into()),
            album: Some(album.into()),
            ..Default::default()
        }
    }

    fn settings(max_same_state: u32) -> PollerSettings {
        PollerSettings {
            interval: Duration::from_millis(2),
            max_same_state,
            stop_timeout: Duration::from_secs(1),
        }
    }

    fn service(max_same_state: u32) -> (NowPlaying, Receiver<TrackEvent>) {
        let (tx, rx) = unbounded();
        let sink = EventSink::spawn(move |e| {
            let _ = tx.send(e);
        })
        .unwrap();
        (NowPlaying::new(sink, settings(max_same_state)), rx)
    }

    fn wait_stopped(np: &NowPlaying) {
        for _ in 0..200 {
            if np.loop_state() == LoopState::Stopped {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("loop never stopped on its own");
    }

    fn drain(np: NowPlaying, rx: Receiver<TrackEvent>) -> Vec<TrackEvent> {
        drop(np);
        rx.iter().collect()
    }

    #[test]
    fn test_appeared_replaces_running_loop() {
        let (np, rx) = service(u32::MAX);
        let first = Arc::new(SimulatedSession::new("one", meta("A", "B", "C"), RawPlaybackState::Playing));
        let second = Arc::new(SimulatedSession::new("two", meta("D", "E", "F"), RawPlaybackState::Playing));

        np.on_media_appeared(first.clone(), None).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        np.on_media_appeared(second.clone(), None).unwrap();
        assert_eq!(np.loop_state(), LoopState::Running);

        let reads = first.status_reads();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(first.status_reads(), reads);
        assert!(second.status_reads() > 0);

        // Once the second track shows up, the first never comes back
        let events = drain(np, rx);
        let first_of_second = events
            .iter()
            .position(|e| e.snapshot().is_some_and(|s| s.source == "two"))
            .unwrap();
        assert!(events[first_of_second..]
            .iter()
            .all(|e| e.snapshot().is_some_and(|s| s.source == "two")));
    }

    #[test]
    fn test_removed_clears_displayed_track() {
        let (np, rx) = service(10);
        let session = Arc::new(SimulatedSession::new("p", meta("A", "B", "C"), RawPlaybackState::Playing));
        let handle: MediaHandle = session.clone();

        np.on_media_appeared(Arc::clone(&handle), None).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.snapshot().unwrap().id.as_str(), "A:B:C");

        np.on_media_removed(&handle);
        assert_eq!(np.loop_state(), LoopState::Idle);
        assert!(np.current_track().is_none());
        assert!(!np.has_session());

        let events = drain(np, rx);
        assert_eq!(events.last(), Some(&TrackEvent::Cleared));
    }

    #[test]
    fn test_removed_other_track_keeps_display() {
        let (np, rx) = service(10);
        let shown = Arc::new(SimulatedSession::new("p", meta("A", "B", "C"), RawPlaybackState::Playing));
        np.on_media_appeared(shown, None).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        let other: MediaHandle =
            Arc::new(SimulatedSession::new("q", meta("X", "Y", "Z"), RawPlaybackState::Playing));
        np.on_media_removed(&other);

        assert_eq!(
            np.current_track().map(|s| s.id),
            Some(TrackIdentity::derive(Some("A"), Some("B"), Some("C")))
        );
        assert!(!drain(np, rx).contains(&TrackEvent::Cleared));
    }

    #[test]
    fn test_removed_with_failed_read_keeps_display() {
        let (np, rx) = service(10);
        let session = Arc::new(SimulatedSession::new("p", meta("A", "B", "C"), RawPlaybackState::Playing));
        let handle: MediaHandle = session.clone();
        np.on_media_appeared(Arc::clone(&handle), None).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        np.stop_loop();
        session.fail_next_reads(1);
        np.on_media_removed(&handle);

        assert!(np.current_track().is_some());
        assert!(!drain(np, rx).contains(&TrackEvent::Cleared));
    }

    #[test]
    fn test_stopped_reported_for_displayed_track() {
        let (np, rx) = service(3);
        let session = Arc::new(SimulatedSession::new("p", meta("A", "B", "C"), RawPlaybackState::Playing));
        session.script([Some(RawPlaybackState::Playing), Some(RawPlaybackState::Stopped)]);

        np.on_media_appeared(session, None).unwrap();
        wait_stopped(&np);
        let events = drain(np, rx);

        let phases: Vec<PlaybackPhase> = events
            .iter()
            .filter_map(|e| e.snapshot().map(|s| s.state))
            .collect();
        assert_eq!(phases.first(), Some(&PlaybackPhase::Playing));
        assert!(phases[1..].iter().all(|p| *p == PlaybackPhase::Stopped));
    }

    #[test]
    fn test_request_update_uses_last_session() {
        let (np, rx) = service(1);
        assert!(!np.request_update());

        let session = Arc::new(SimulatedSession::new("p", meta("A", "B", "C"), RawPlaybackState::Paused));
        np.on_media_appeared(session.clone(), Some(IconHint::new(vec![5]))).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.snapshot().unwrap().source_icon, Some(vec![5]));

        // Loop gave up after one sample; the on-demand path still works
        wait_stopped(&np);
        session.set_position(1234);
        assert!(np.request_update());

        let update = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let update = update.snapshot().unwrap();
        assert_eq!(update.position_ms, 1234);
        assert!(!update.has_artwork());
    }

    #[test]
    fn test_request_update_leaves_loop_count_alone() {
        let (tx, rx) = unbounded();
        let sink = EventSink::spawn(move |e| {
            let _ = tx.send(e);
        })
        .unwrap();
        let np = NowPlaying::new(
            sink,
            PollerSettings {
                interval: Duration::from_millis(50),
                max_same_state: 3,
                stop_timeout: Duration::from_secs(1),
            },
        );
        let session = Arc::new(SimulatedSession::new("p", meta("A", "B", "C"), RawPlaybackState::Playing));

        np.on_media_appeared(session.clone(), None).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // Loop is sleeping between its first and second sample
        assert_eq!(np.loop_state(), LoopState::Running);
        assert!(np.request_update());

        wait_stopped(&np);
        // Three loop samples plus the one on-demand read
        assert_eq!(session.status_reads(), 4);
        assert_eq!(drain(np, rx).len(), 3);
    }
}
