//! Background sampling loop for one media session.
//!
//! The loop samples the session at a fixed interval, forwards accepted
//! snapshots to the sink and gives up on its own once the session has
//! reported the same phase for `max_same_state` samples in a row.
//! Cancellation is cooperative: a flag checked at iteration boundaries (and
//! under the sink lock right before emitting) plus a wake-up channel that
//! doubles as the loop's sleep.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::{extract, EventSink, IconHint, MediaHandle, PlaybackPhase};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_SAME_STATE: u32 = 10;
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollerSettings {
    /// Time between two samples
    pub interval: Duration,
    /// Consecutive samples with an identical phase before the loop quits
    pub max_same_state: u32,
    /// How long `stop` waits for the loop to exit
    pub stop_timeout: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_same_state: DEFAULT_MAX_SAME_STATE,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Controller side of a running loop.
pub struct PollingLoop {
    cancelled: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    wake_tx: Sender<()>,
    // Never written to; disconnects when the loop thread exits
    done_rx: Receiver<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PollingLoop {
    /// Start sampling `session` on a new thread.
    pub fn spawn(
        session: MediaHandle,
        icon: Option<IconHint>,
        sink: Arc<EventSink>,
        settings: PollerSettings,
    ) -> std::io::Result<Self> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(LoopState::Idle as u8));
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(0);

        let worker = Worker {
            session,
            icon,
            sink,
            settings,
            cancelled: Arc::clone(&cancelled),
            state: Arc::clone(&state),
            wake_rx,
        };

        state.store(LoopState::Running as u8, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("track-poller".into())
            .spawn(move || {
                let _done = done_tx;
                worker.run();
            });

        let handle = match handle {
            Ok(h) => h,
            Err(e) => {
                state.store(LoopState::Stopped as u8, Ordering::SeqCst);
                return Err(e);
            }
        };

        Ok(Self {
            cancelled,
            state,
            wake_tx,
            done_rx,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_finished(&self) -> bool {
        self.state() == LoopState::Stopped
    }

    /// Block until the loop exits on its own, up to `timeout`.
    pub fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.done_rx.recv_timeout(timeout),
            Ok(()) | Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Cancel the loop and wait up to `timeout` for it to exit.
    ///
    /// Safe to call repeatedly. Returns false if the loop was still running
    /// when the wait ran out; it is detached and can no longer emit. Later
    /// calls report whether a detached loop has exited since.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.request_cancel();

        let Some(handle) = self.handle.take() else {
            return self.wait(Duration::ZERO);
        };

        if handle.thread().id() == thread::current().id() {
            // Stopping from inside the loop: it exits at the next boundary
            return false;
        }

        if self.wait(timeout) {
            let _ = handle.join();
            true
        } else {
            tracing::warn!(
                "[Poller] Polling thread did not stop within {:?}, detaching",
                timeout
            );
            false
        }
    }

    fn request_cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            let _ = self.state.compare_exchange(
                LoopState::Running as u8,
                LoopState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            let _ = self.wake_tx.try_send(());
        }
    }
}

impl Drop for PollingLoop {
    fn drop(&mut self) {
        self.request_cancel();
    }
}

struct Worker {
    session: MediaHandle,
    icon: Option<IconHint>,
    sink: Arc<EventSink>,
    settings: PollerSettings,
    cancelled: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    wake_rx: Receiver<()>,
}

impl Worker {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn run(self) {
        tracing::debug!(
            "[Poller] Polling thread started ({} via {:?})",
            self.session.source_package(),
            self.settings.interval
        );

        let mut same_state = 0u32;
        let mut last_phase: Option<PlaybackPhase> = None;

        loop {
            if self.is_cancelled() {
                break;
            }

            let last_sent = self.sink.last_identity();
            match extract(self.session.as_ref(), last_sent.as_ref(), self.icon.as_ref()) {
                Some(snapshot) => {
                    let phase = snapshot.state;
                    if !self.sink.emit_unless(snapshot, || self.is_cancelled()) {
                        break;
                    }

                    same_state = if last_phase == Some(phase) { same_state + 1 } else { 1 };
                    last_phase = Some(phase);

                    if same_state >= self.settings.max_same_state {
                        tracing::debug!(
                            "[Poller] {:?} unchanged for {} samples, stopping poll",
                            phase,
                            same_state
                        );
                        break;
                    }
                }
                None => {
                    same_state = 0;
                    last_phase = None;
                }
            }

            match self.wake_rx.recv_timeout(self.settings.interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.state.store(LoopState::Stopping as u8, Ordering::SeqCst);
        tracing::debug!("[Poller] Polling thread ended");
        self.state.store(LoopState::Stopped as u8, Ordering::SeqCst);
    }
}
