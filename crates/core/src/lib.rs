//! Client library for downloading AI-generated subtitles from Bilibili.
//! It handles cookie-based authentication, the WBI request-signing scheme,
//! track discovery and download, format conversion and advisory caching.

pub mod cache;
pub mod client;
pub mod convert;
pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod subtitle;
pub mod wbi;

pub use cache::{CacheRecord, MemoryCache, SubtitleCache};
pub use client::BiliClient;
pub use convert::{render, Format};
pub use credentials::{CredentialBundle, CredentialSource};
pub use error::{Error, Result};
pub use pipeline::{Outcome, Pipeline, SubtitleOutput};
pub use resolver::VideoRef;
pub use subtitle::{Segment, SubtitleContent, SubtitleTrack, TrackKind};
