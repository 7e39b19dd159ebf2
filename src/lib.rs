//! Deduplicated, debounced "now playing" events from a device media session.
//!
//! [`media::NowPlaying`] owns the polling loop for the session that appeared
//! last and pushes [`media::TrackEvent`]s through an [`media::EventSink`] to
//! a consumer. Platform glue drives it directly or through
//! [`media::SessionRegistry`].

pub mod config;
pub mod error;
pub mod logging;
pub mod media;
