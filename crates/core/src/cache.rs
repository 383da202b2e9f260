//! Advisory fetch cache: a fact table from (video id, track id) to what
//! already exists. It never performs I/O and only ever costs extra work
//! when stale, never wrong output; callers stay correct on a cold cache.

use std::collections::{BTreeSet, HashMap};

use crate::convert::Format;

/// What the cache knows about one (video, track) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRecord {
    /// The raw subtitle payload has been fetched before.
    pub raw_present: bool,
    /// Render targets already produced for this track.
    pub rendered: BTreeSet<Format>,
}

impl CacheRecord {
    pub fn has_rendered(&self, format: Format) -> bool {
        self.rendered.contains(&format)
    }
}

/// The narrow interface the pipeline depends on. Any storage backend can
/// sit behind it; the in-memory table below is the default.
pub trait SubtitleCache {
    /// Look up the record for a track, if any.
    fn get(&self, video_id: &str, track_id: i64) -> Option<&CacheRecord>;

    /// Note that the raw payload of a track has been fetched.
    fn record_raw_fetched(&mut self, video_id: &str, track_id: i64);

    /// Note that a render target has been produced for a track.
    fn record_rendered(&mut self, video_id: &str, track_id: i64, format: Format);
}

/// In-memory cache, one record per (video id, track id).
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: HashMap<(String, i64), CacheRecord>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, video_id: &str, track_id: i64) -> &mut CacheRecord {
        self.records
            .entry((video_id.to_string(), track_id))
            .or_default()
    }
}

impl SubtitleCache for MemoryCache {
    fn get(&self, video_id: &str, track_id: i64) -> Option<&CacheRecord> {
        self.records.get(&(video_id.to_string(), track_id))
    }

    fn record_raw_fetched(&mut self, video_id: &str, track_id: i64) {
        self.entry(video_id, track_id).raw_present = true;
    }

    fn record_rendered(&mut self, video_id: &str, track_id: i64, format: Format) {
        self.entry(video_id, track_id).rendered.insert(format);
    }
}
