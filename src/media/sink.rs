//! Event sink: remembers what the consumer was last told and delivers
//! events to it, in order, on a dedicated thread.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam_channel::{unbounded, Sender};

use super::{TrackEvent, TrackIdentity, TrackSnapshot};

/// Receives track events. Always called from the delivery thread, one event
/// at a time.
pub trait TrackConsumer: Send + 'static {
    fn on_event(&mut self, event: TrackEvent);
}

impl<F> TrackConsumer for F
where
    F: FnMut(TrackEvent) + Send + 'static,
{
    fn on_event(&mut self, event: TrackEvent) {
        self(event)
    }
}

/// The most recently emitted snapshot, or nothing after a clear.
#[derive(Default)]
pub struct LastSent {
    cell: Mutex<Option<TrackSnapshot>>,
}

impl LastSent {
    fn lock(&self) -> MutexGuard<'_, Option<TrackSnapshot>> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identity(&self) -> Option<TrackIdentity> {
        self.lock().as_ref().map(|s| s.id.clone())
    }

    pub fn snapshot(&self) -> Option<TrackSnapshot> {
        self.lock().clone()
    }
}

enum Delivery {
    Event(TrackEvent),
    Shutdown,
}

pub struct EventSink {
    last_sent: LastSent,
    tx: Sender<Delivery>,
    worker: Option<thread::JoinHandle<()>>,
}

impl EventSink {
    /// Start the delivery thread for `consumer`.
    pub fn spawn<C: TrackConsumer>(mut consumer: C) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Delivery>();

        let worker = thread::Builder::new()
            .name("track-delivery".into())
            .spawn(move || {
                tracing::debug!("[Sink] Delivery thread started");
                for delivery in rx.iter() {
                    match delivery {
                        Delivery::Event(event) => consumer.on_event(event),
                        Delivery::Shutdown => break,
                    }
                }
                tracing::debug!("[Sink] Delivery thread ended");
            })?;

        Ok(Self {
            last_sent: LastSent::default(),
            tx,
            worker: Some(worker),
        })
    }

    /// Record `snapshot` as last sent and queue it for delivery.
    pub fn emit(&self, snapshot: TrackSnapshot) {
        self.emit_unless(snapshot, || false);
    }

    /// Like [`emit`](Self::emit), but drops the snapshot if `cancelled`
    /// reports true once the lock is held. Returns whether it was emitted.
    pub fn emit_unless(&self, snapshot: TrackSnapshot, cancelled: impl FnOnce() -> bool) -> bool {
        let mut last = self.last_sent.lock();
        if cancelled() {
            return false;
        }
        *last = Some(snapshot.clone());
        self.deliver(TrackEvent::Track(snapshot));
        true
    }

    /// Emit a cleared event if `id` is the track currently on display.
    pub fn clear_if_current(&self, id: &TrackIdentity) -> bool {
        let mut last = self.last_sent.lock();
        if last.as_ref().map(|s| &s.id) != Some(id) {
            return false;
        }
        *last = None;
        self.deliver(TrackEvent::Cleared);
        true
    }

    pub fn last_identity(&self) -> Option<TrackIdentity> {
        self.last_sent.identity()
    }

    /// What the consumer was last told, for on-demand queries.
    pub fn current(&self) -> Option<TrackSnapshot> {
        self.last_sent.snapshot()
    }

    // Called with the last-sent lock held so delivery order matches.
    fn deliver(&self, event: TrackEvent) {
        if self.tx.send(Delivery::Event(event)).is_err() {
            tracing::warn!("[Sink] Delivery thread is gone, event dropped");
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        let _ = self.tx.send(Delivery::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("[Sink] Consumer panicked on the delivery thread");
            }
        }
    }
}
