//! Error taxonomy shared by every component of the client.
//! Callers decide which kinds are fatal; nothing here exits the process.

use thiserror::Error;

/// All failure kinds the client can surface.
/// Transport retries happen inside the HTTP client before any of these
/// reach a caller; platform-reported logical errors are never retried.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable credentials were configured at all.
    #[error("no usable credentials configured: {0}")]
    AuthConfig(String),

    /// Credentials were rejected, or the session lacks the membership
    /// tier required for AI subtitle access.
    #[error("session rejected by the platform: {0}")]
    AuthInvalid(String),

    /// The signing key material could not be fetched or parsed.
    #[error("could not obtain signing key material: {0}")]
    SignatureBootstrap(String),

    /// The input string contains no recognizable video identifier.
    #[error("could not extract a video id from {input:?}")]
    InvalidReference { input: String },

    /// The platform reports the video absent, deleted or restricted.
    #[error("video {id} not found or restricted (platform code {code})")]
    VideoNotFound { id: String, code: i64 },

    /// Transport failure while downloading a subtitle track payload.
    #[error("failed to download subtitle track {track_id} of {video_id}: {reason}")]
    SubtitleFetch {
        video_id: String,
        track_id: i64,
        reason: String,
    },

    /// The track payload was downloaded but cannot be parsed into segments.
    #[error("unparsable subtitle payload: {0}")]
    SubtitleFormat(String),

    /// The requested render target is not one of txt/srt/vtt/lrc.
    #[error("unsupported subtitle format {0:?}")]
    UnsupportedFormat(String),

    /// The platform is throttling us; callers may back off and retry.
    #[error("rate limited by the platform (code {code})")]
    RateLimited { code: i64 },

    /// A platform error code we do not classify further.
    #[error("platform error {code}: {message}")]
    Platform { code: i64, message: String },

    /// Transport failure outside track download, after retries.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
