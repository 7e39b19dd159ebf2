use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;

use nowplaying::config::WatcherConfig;
use nowplaying::logging;
use nowplaying::media::simulated::SimulatedSession;
use nowplaying::media::{
    EventSink, IconHint, MediaHandle, NowPlaying, PlaybackPhase, RawPlaybackState,
    SessionRegistry, TrackEvent, TrackMetadata, TrackSnapshot,
};

const SESSION_KEY: &str = "simulated-player";

fn playlist() -> Vec<TrackMetadata> {
    let track = |title: &str, artist: &str, album: &str, secs: i64| TrackMetadata {
        title: Some(title.to_string()),
        artist: Some(artist.to_string()),
        album: Some(album.to_string()),
        duration_ms: secs * 1000,
        art_uri: Some(format!("content://art/{}", title.to_lowercase().replace(' ', "-"))),
        ..Default::default()
    };

    vec![
        track("Blue in Green", "Miles Davis", "Kind of Blue", 337),
        track("Naima", "John Coltrane", "Giant Steps", 261),
        track("Peace Piece", "Bill Evans", "Everybody Digs Bill Evans", 402),
    ]
}

fn print_track_info(track: &TrackSnapshot) {
    println!("\n🎵 NOW PLAYING 🎵");
    println!("   App:    {}", track.source);
    println!("   Track:  {}", track.title.as_deref().unwrap_or("-"));
    println!("   Artist: {}", track.artist.as_deref().unwrap_or("-"));
    println!("   Album:  {}", track.album.as_deref().unwrap_or("-"));
    println!("   Pos:    {} / {} ms", track.position_ms, track.duration_ms);

    let state = match track.state {
        PlaybackPhase::Playing => "▶ Playing",
        PlaybackPhase::Paused => "⏸ Paused",
        _ => "⏹ Stopped",
    };
    println!("   State:  {}", state);
}

fn print_event(event: TrackEvent) {
    match event.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("[Main] Failed to encode event: {}", e),
    }
}

#[cfg(unix)]
fn spawn_update_signal(registry: Arc<SessionRegistry>) -> anyhow::Result<()> {
    use signal_hook::consts::SIGUSR1;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGUSR1]).context("failed to register SIGUSR1")?;
    std::thread::Builder::new()
        .name("update-signal".into())
        .spawn(move || {
            for _ in signals.forever() {
                tracing::info!("[Main] SIGUSR1 received, requesting update");
                registry.request_update();
            }
        })
        .context("failed to start signal thread")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Load errors are logged once the subscriber is up
    let (config, config_error) = match WatcherConfig::default_path() {
        Ok(path) => WatcherConfig::load_with_fallback(&path),
        Err(e) => (WatcherConfig::default(), Some(e)),
    };

    let log_dir = if config.log_to_file {
        Some(WatcherConfig::log_dir()?)
    } else {
        None
    };
    let _log_guard = logging::init(&config.log_filter, log_dir.as_deref())?;
    if let Some(e) = config_error {
        tracing::warn!("[Config] {}, using defaults", e);
    }

    let sink = EventSink::spawn(print_event).context("failed to start delivery thread")?;
    let now_playing = Arc::new(NowPlaying::new(sink, config.poller_settings()));
    let registry = Arc::new(SessionRegistry::new(now_playing));

    #[cfg(unix)]
    spawn_update_signal(Arc::clone(&registry))?;

    let tracks = playlist();
    let mut current = 0;
    let session = Arc::new(SimulatedSession::new(
        "com.example.simulated",
        tracks[current].clone(),
        RawPlaybackState::Paused,
    ));
    let handle: MediaHandle = session.clone();
    let icon = IconHint::new(b"\x89PNG simulated icon".to_vec());

    registry.on_listener_connected(Vec::new())?;

    println!("========================================");
    println!("      nowplaying session harness        ");
    println!("========================================");
    println!("Commands:");
    println!("  [o] post     Post the media notification");
    println!("  [r] remove   Remove the media notification");
    println!("  [p] play     Start playback");
    println!("  [a] pause    Pause playback");
    println!("  [s] stop     Stop playback");
    println!("  [n] next     Skip to next track");
    println!("  [u] update   Request the current state");
    println!("  [i] info     Show current track info");
    println!("  [q] quit     Exit");
    println!("----------------------------------------");

    // Playback changes re-post the notification, like a real player would
    let repost = || -> io::Result<()> {
        if registry.is_tracked(SESSION_KEY) {
            registry.on_notification_posted(SESSION_KEY, Arc::clone(&handle), Some(icon.clone()))?;
        }
        Ok(())
    };

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        match input.trim() {
            "o" | "post" => {
                registry.on_notification_posted(SESSION_KEY, Arc::clone(&handle), Some(icon.clone()))?;
            }
            "r" | "remove" => registry.on_notification_removed(SESSION_KEY),
            "p" | "play" => {
                session.set_state(RawPlaybackState::Playing);
                repost()?;
            }
            "a" | "pause" => {
                session.set_state(RawPlaybackState::Paused);
                repost()?;
            }
            "s" | "stop" => {
                session.set_state(RawPlaybackState::Stopped);
                repost()?;
            }
            "n" | "next" => {
                current = (current + 1) % tracks.len();
                session.set_metadata(tracks[current].clone());
                session.set_position(0);
                repost()?;
            }
            "u" | "update" => {
                if !registry.request_update() {
                    println!("[INFO] Nothing to report.");
                }
            }
            "i" | "info" => match registry.now_playing().current_track() {
                Some(track) => print_track_info(&track),
                None => println!("[INFO] No track info available yet."),
            },
            "q" | "quit" => break,
            "" => {}
            _ => println!("Unknown command. Use o, r, p, a, s, n, u, i or q."),
        }
    }

    registry.on_listener_disconnected();
    registry.now_playing().stop_loop();
    Ok(())
}
