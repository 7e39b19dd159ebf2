//! Turns one read of a media session into a snapshot worth reporting, or
//! nothing.

use super::{
    IconHint, MediaSession, PlaybackPhase, TrackIdentity, TrackMetadata, TrackSnapshot,
};
use crate::error::MediaError;

/// Why a sample did not produce a snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Skip {
    NoMetadata,
    NoPlaybackState,
    UnknownPhase,
    /// A different track than the one on display showed up paused
    PausedOtherTrack,
    /// Only the track on display may be reported as stopped
    StoppedOtherTrack,
    ReadFailed(String),
}

/// Sample `session` once.
///
/// `last_sent` is the identity currently on display (if any) and `icon` the
/// hint captured when the session appeared. Every provider failure ends up
/// as `None`; the caller treats that as "nothing this time, keep polling".
pub fn extract(
    session: &dyn MediaSession,
    last_sent: Option<&TrackIdentity>,
    icon: Option<&IconHint>,
) -> Option<TrackSnapshot> {
    match try_extract(session, last_sent, icon) {
        Ok(snapshot) => Some(snapshot),
        Err(Skip::ReadFailed(e)) => {
            tracing::warn!("[Extract] Failed to read media session: {}", e);
            None
        }
        Err(reason) => {
            tracing::trace!("[Extract] Sample skipped: {:?}", reason);
            None
        }
    }
}

/// Same as [`extract`] but reports the reason a sample was dropped.
pub fn try_extract(
    session: &dyn MediaSession,
    last_sent: Option<&TrackIdentity>,
    icon: Option<&IconHint>,
) -> Result<TrackSnapshot, Skip> {
    let meta = session.metadata().map_err(|e| read_error(e, Skip::NoMetadata))?;
    let id = meta.identity();

    let status = session
        .playback_status()
        .map_err(|e| read_error(e, Skip::NoPlaybackState))?;

    let phase = PlaybackPhase::from_raw(status.state);
    let is_displayed = last_sent == Some(&id);

    match phase {
        PlaybackPhase::Unknown => return Err(Skip::UnknownPhase),
        PlaybackPhase::Paused if last_sent.is_some() && !is_displayed => {
            return Err(Skip::PausedOtherTrack);
        }
        PlaybackPhase::Stopped if !is_displayed => return Err(Skip::StoppedOtherTrack),
        _ => {}
    }

    let mut snapshot = TrackSnapshot {
        id,
        source: session.source_package(),
        state: phase,
        album: meta.album.clone(),
        title: meta.title.clone(),
        artist: meta.artist.clone(),
        genre: meta.genre.clone(),
        duration_ms: meta.duration_ms,
        position_ms: status.position_ms,
        source_icon: None,
        image: None,
        image_uri: None,
    };

    // Artwork only travels with the first sighting of a playing/paused track
    if phase != PlaybackPhase::Stopped && !is_displayed {
        snapshot.source_icon = icon.map(IconHint::to_vec);
        attach_artwork(&mut snapshot, meta);
    }

    Ok(snapshot)
}

/// Bytes win over URIs; the track's own art wins over the album's.
fn attach_artwork(snapshot: &mut TrackSnapshot, meta: TrackMetadata) {
    match meta.art.or(meta.album_art) {
        Some(bytes) => snapshot.image = Some(bytes),
        None => snapshot.image_uri = meta.art_uri.or(meta.album_art_uri),
    }
}

fn read_error(err: MediaError, unavailable: Skip) -> Skip {
    match err {
        MediaError::Unavailable(_) => unavailable,
        MediaError::Backend(msg) => Skip::ReadFailed(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::simulated::SimulatedSession;
    use crate::media::RawPlaybackState;

    fn abc() -> TrackMetadata {
        TrackMetadata {
            title: Some("A".into()),
            artist: Some("B".into()),
            album: Some("C".into()),
            genre: Some("Jazz".into()),
            duration_ms: 200_000,
            art: Some(vec![0xAA]),
            ..Default::default()
        }
    }

    fn id(s: &str) -> TrackIdentity {
        let mut parts = s.split(':');
        TrackIdentity::derive(parts.next(), parts.next(), parts.next())
    }

    #[test]
    fn test_new_track_playing_carries_artwork() {
        let session = SimulatedSession::new("com.example.player", abc(), RawPlaybackState::Playing);
        let icon = IconHint::new(vec![9, 9]);

        let snap = extract(&session, None, Some(&icon)).unwrap();
        assert_eq!(snap.id.as_str(), "A:B:C");
        assert_eq!(snap.state, PlaybackPhase::Playing);
        assert_eq!(snap.source, "com.example.player");
        assert_eq!(snap.genre.as_deref(), Some("Jazz"));
        assert_eq!(snap.duration_ms, 200_000);
        assert_eq!(snap.image, Some(vec![0xAA]));
        assert_eq!(snap.source_icon, Some(vec![9, 9]));
        assert_eq!(snap.image_uri, None);
    }

    #[test]
    fn test_same_track_skips_artwork() {
        let session = SimulatedSession::new("p", abc(), RawPlaybackState::Playing);
        let icon = IconHint::new(vec![1]);

        let snap = extract(&session, Some(&id("A:B:C")), Some(&icon)).unwrap();
        assert_eq!(snap.id.as_str(), "A:B:C");
        assert!(!snap.has_artwork());
    }

    #[test]
    fn test_paused_other_track_is_suppressed() {
        let session = SimulatedSession::new("p", abc(), RawPlaybackState::Paused);

        assert_eq!(
            try_extract(&session, Some(&id("X:Y:Z")), None),
            Err(Skip::PausedOtherTrack)
        );
        // Nothing on display yet: a paused session is accepted
        let snap = extract(&session, None, None).unwrap();
        assert_eq!(snap.state, PlaybackPhase::Paused);
        assert_eq!(snap.image, Some(vec![0xAA]));
        // Same track paused: accepted, no artwork
        let snap = extract(&session, Some(&id("A:B:C")), None).unwrap();
        assert!(!snap.has_artwork());
    }

    #[test]
    fn test_stopped_only_for_displayed_track() {
        let session = SimulatedSession::new("p", abc(), RawPlaybackState::Stopped);

        assert_eq!(try_extract(&session, None, None), Err(Skip::StoppedOtherTrack));
        assert_eq!(
            try_extract(&session, Some(&id("X:Y:Z")), None),
            Err(Skip::StoppedOtherTrack)
        );

        let snap = extract(&session, Some(&id("A:B:C")), Some(&IconHint::new(vec![1]))).unwrap();
        assert_eq!(snap.state, PlaybackPhase::Stopped);
        assert!(!snap.has_artwork());
    }

    #[test]
    fn test_unknown_phase_is_filtered() {
        let session = SimulatedSession::new("p", abc(), RawPlaybackState::Buffering);
        assert_eq!(try_extract(&session, None, None), Err(Skip::UnknownPhase));
    }

    #[test]
    fn test_unavailable_reads() {
        let session = SimulatedSession::new("p", abc(), RawPlaybackState::Playing);
        session.set_metadata_unavailable();
        assert_eq!(try_extract(&session, None, None), Err(Skip::NoMetadata));

        let session = SimulatedSession::new("p", abc(), RawPlaybackState::Playing);
        session.set_status_unavailable();
        assert_eq!(try_extract(&session, None, None), Err(Skip::NoPlaybackState));
    }

    #[test]
    fn test_backend_failure_is_swallowed() {
        let session = SimulatedSession::new("p", abc(), RawPlaybackState::Playing);
        session.fail_next_reads(1);
        assert!(extract(&session, None, None).is_none());
        assert!(extract(&session, None, None).is_some());
    }

    #[test]
    fn test_artwork_fallback_order() {
        let mut meta = abc();
        meta.art = None;
        meta.album_art = Some(vec![0xBB]);
        meta.art_uri = Some("content://art".into());
        let session = SimulatedSession::new("p", meta.clone(), RawPlaybackState::Playing);
        let snap = extract(&session, None, None).unwrap();
        assert_eq!(snap.image, Some(vec![0xBB]));
        assert_eq!(snap.image_uri, None);

        meta.album_art = None;
        meta.album_art_uri = Some("content://album".into());
        let session = SimulatedSession::new("p", meta.clone(), RawPlaybackState::Playing);
        let snap = extract(&session, None, None).unwrap();
        assert_eq!(snap.image, None);
        assert_eq!(snap.image_uri.as_deref(), Some("content://art"));

        meta.art_uri = None;
        let session = SimulatedSession::new("p", meta, RawPlaybackState::Playing);
        let snap = extract(&session, None, None).unwrap();
        assert_eq!(snap.image_uri.as_deref(), Some("content://album"));
    }
}
