use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use serde::{Serialize, Serializer};

use crate::error::MediaError;

pub mod extract;
pub mod lifecycle;
pub mod poller;
pub mod registry;
pub mod simulated;
pub mod sink;

pub use extract::extract;
pub use lifecycle::NowPlaying;
pub use poller::{LoopState, PollerSettings, PollingLoop};
pub use registry::SessionRegistry;
pub use sink::{EventSink, LastSent, TrackConsumer};

// ==============================================================
// PROVIDER SIDE (what a platform session hands us)
// ==============================================================

/// Raw playback state as published by a platform media session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawPlaybackState {
    None,
    Stopped,
    Paused,
    Playing,
    FastForwarding,
    Rewinding,
    Buffering,
    Error,
    Connecting,
    SkippingToPrevious,
    SkippingToNext,
    SkippingToQueueItem,
}

/// Playback status read from a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: RawPlaybackState,
    pub position_ms: i64,
}

/// Metadata read from a session. Artwork comes already encoded;
/// decoding bitmaps is the provider's business.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub duration_ms: i64,
    pub art: Option<Vec<u8>>,
    pub album_art: Option<Vec<u8>>,
    pub art_uri: Option<String>,
    pub album_art_uri: Option<String>,
}

impl TrackMetadata {
    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity::derive(
            self.title.as_deref(),
            self.artist.as_deref(),
            self.album.as_deref(),
        )
    }
}

/// A live media session. Implementations must be cheap enough to query at
/// polling cadence and must never block indefinitely.
pub trait MediaSession: Send + Sync {
    fn metadata(&self) -> Result<TrackMetadata, MediaError>;
    fn playback_status(&self) -> Result<PlaybackStatus, MediaError>;
    fn source_package(&self) -> String;
}

/// Opaque handle to a media session
pub type MediaHandle = Arc<dyn MediaSession>;

/// Encoded icon of the app owning the session, captured when the session
/// was announced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconHint(Arc<[u8]>);

impl IconHint {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

// ==============================================================
// TRACK STATE (what we hand the consumer)
// ==============================================================

/// Key used to decide whether two samples refer to the same track.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TrackIdentity(String);

impl TrackIdentity {
    /// `title:artist:album`, absent parts rendered as empty strings.
    pub fn derive(title: Option<&str>, artist: Option<&str>, album: Option<&str>) -> Self {
        Self(format!(
            "{}:{}:{}",
            title.unwrap_or_default(),
            artist.unwrap_or_default(),
            album.unwrap_or_default()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized playback phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaybackPhase {
    Playing,
    Paused,
    Stopped,
    Unknown,
}

impl PlaybackPhase {
    pub fn from_raw(raw: RawPlaybackState) -> Self {
        match raw {
            RawPlaybackState::Playing => Self::Playing,
            RawPlaybackState::Paused => Self::Paused,
            RawPlaybackState::Stopped => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    /// Wire code used in event payloads.
    pub fn code(self) -> i32 {
        match self {
            Self::Playing => 0,
            Self::Paused => 1,
            Self::Stopped => 2,
            Self::Unknown => -1,
        }
    }
}

impl Serialize for PlaybackPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

/// One accepted sample of a session, as delivered to the consumer
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSnapshot {
    pub id: TrackIdentity,
    pub source: String,
    pub state: PlaybackPhase,
    pub album: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub genre: Option<String>,
    #[serde(rename = "duration")]
    pub duration_ms: i64,
    #[serde(rename = "position")]
    pub position_ms: i64,

    // Only filled on the first sighting of a track
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "as_base64")]
    pub source_icon: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "as_base64")]
    pub image: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
}

impl TrackSnapshot {
    pub fn has_artwork(&self) -> bool {
        self.source_icon.is_some() || self.image.is_some() || self.image_uri.is_some()
    }
}

fn as_base64<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => serializer.serialize_str(&general_purpose::STANDARD.encode(b)),
        None => serializer.serialize_none(),
    }
}

/// What the consumer receives
#[derive(Clone, Debug, PartialEq)]
pub enum TrackEvent {
    Track(TrackSnapshot),
    /// Nothing the consumer was showing is playing anymore
    Cleared,
}

impl TrackEvent {
    pub fn snapshot(&self) -> Option<&TrackSnapshot> {
        match self {
            Self::Track(s) => Some(s),
            Self::Cleared => None,
        }
    }

    /// JSON payload: the track object, or `null` when cleared.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_joins_fields() {
        let id = TrackIdentity::derive(Some("A"), Some("B"), Some("C"));
        assert_eq!(id.as_str(), "A:B:C");
    }

    #[test]
    fn test_identity_absent_fields_collapse() {
        let none = TrackIdentity::derive(None, None, None);
        let empty = TrackIdentity::derive(Some(""), Some(""), Some(""));
        assert_eq!(none.as_str(), "::");
        assert_eq!(none, empty);

        let partial = TrackIdentity::derive(Some("Song"), None, Some("LP"));
        assert_eq!(partial.as_str(), "Song::LP");
    }

    #[test]
    fn test_identity_is_deterministic() {
        let meta = TrackMetadata {
            title: Some("Title".into()),
            artist: Some("Artist".into()),
            album: None,
            ..Default::default()
        };
        assert_eq!(meta.identity(), meta.clone().identity());
        assert_ne!(
            meta.identity(),
            TrackIdentity::derive(Some("Title"), Some("Other"), None)
        );
    }

    #[test]
    fn test_phase_mapping() {
        assert_eq!(PlaybackPhase::from_raw(RawPlaybackState::Playing), PlaybackPhase::Playing);
        assert_eq!(PlaybackPhase::from_raw(RawPlaybackState::Paused), PlaybackPhase::Paused);
        assert_eq!(PlaybackPhase::from_raw(RawPlaybackState::Stopped), PlaybackPhase::Stopped);
        for raw in [
            RawPlaybackState::None,
            RawPlaybackState::Buffering,
            RawPlaybackState::Error,
            RawPlaybackState::SkippingToNext,
        ] {
            assert_eq!(PlaybackPhase::from_raw(raw), PlaybackPhase::Unknown);
        }
    }

    #[test]
    fn test_event_payload_shape() {
        let snapshot = TrackSnapshot {
            id: TrackIdentity::derive(Some("A"), Some("B"), Some("C")),
            source: "com.example.player".into(),
            state: PlaybackPhase::Paused,
            album: Some("C".into()),
            title: Some("A".into()),
            artist: Some("B".into()),
            genre: None,
            duration_ms: 180_000,
            position_ms: 42,
            source_icon: None,
            image: Some(vec![1, 2, 3]),
            image_uri: None,
        };

        let json: serde_json::Value =
            serde_json::from_str(&TrackEvent::Track(snapshot).to_json().unwrap()).unwrap();
        assert_eq!(json["id"], "A:B:C");
        assert_eq!(json["state"], 1);
        assert_eq!(json["duration"], 180_000);
        assert_eq!(json["position"], 42);
        assert_eq!(json["image"], "AQID");
        assert!(json["genre"].is_null());
        assert!(json.get("sourceIcon").is_none());
        assert!(json.get("imageUri").is_none());

        assert_eq!(TrackEvent::Cleared.to_json().unwrap(), "null");
    }
}
