use thiserror::Error;

/// Analysis pipeline failures. Non-fatal: the player keeps running with the
/// visualizer disabled.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("audio analysis unavailable: {0}")]
    Unavailable(String),
    #[error("sampler is already attached to another source")]
    AlreadyAttached,
}

/// Malformed persisted state. Recovered by clearing the store and starting
/// from the no-playlist state.
#[derive(Debug, Error)]
pub enum PersistedStateError {
    #[error("malformed persisted playlist: {0}")]
    Playlist(#[from] serde_json::Error),
    #[error("malformed persisted {key}: {value:?}")]
    Scalar { key: &'static str, value: String },
}

/// Playback failures. Recovered by reverting to paused affordances or
/// skipping to the next track, never by crashing the player.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio output device: {0}")]
    Device(String),
    #[error("failed to decode {name}: {reason}")]
    Decode { name: String, reason: String },
    #[error("track not found: {0}")]
    TrackNotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
