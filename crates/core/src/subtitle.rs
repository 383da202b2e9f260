//! Subtitle track discovery and download.
//! Track listings come from the signed player endpoint with unsigned
//! fallbacks; track payloads are fetched straight from the subtitle CDN.

use serde::Deserialize;
use tracing::{debug, info, trace};

use crate::client::{classify, envelope_error, ApiStatus, BiliClient};
use crate::error::{Error, Result};
use crate::resolver::VideoRef;

const PLAYER_WBI_PATH: &str = "/x/player/wbi/v2";
const PLAYER_PATH: &str = "/x/player/v2";
const SUBTITLE_CDN: &str = "https://aisubtitle.hdslb.com";

/// What produced a subtitle track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    AiGenerated,
    Human,
    ClosedCaption,
}

/// One subtitle track of a video.
#[derive(Debug, Clone)]
pub struct SubtitleTrack {
    pub id: i64,
    /// Language code, e.g. `ai-zh` for machine-generated Chinese.
    pub lan: String,
    /// Human-readable language description.
    pub lan_doc: String,
    pub kind: TrackKind,
    /// Download URL, already carrying the CDN auth key.
    pub url: String,
}

/// One timed segment of a track. Ordered by start time; overlapping
/// segments are tolerated, the source does not guarantee disjoint ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// A downloaded, parsed subtitle track.
#[derive(Debug, Clone)]
pub struct SubtitleContent {
    pub video_id: String,
    pub track_id: i64,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct PlayerData {
    #[serde(default)]
    subtitle: SubtitleInfo,
}

#[derive(Debug, Default, Deserialize)]
struct SubtitleInfo {
    #[serde(default)]
    subtitles: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    id: i64,
    #[serde(default)]
    lan: String,
    #[serde(default)]
    lan_doc: String,
    #[serde(default)]
    ai_type: i64,
    #[serde(rename = "type", default)]
    track_type: i64,
    #[serde(default)]
    subtitle_url: String,
}

/// The raw timed-text payload served by the CDN. Times are fractional
/// seconds; `body` is required so a foreign payload fails loudly.
#[derive(Debug, Deserialize)]
struct RawPayload {
    body: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    #[serde(default)]
    from: f64,
    #[serde(default)]
    to: f64,
    #[serde(default)]
    content: String,
}

impl RawTrack {
    fn kind(&self) -> TrackKind {
        if self.ai_type > 0 || self.lan.contains("ai") {
            TrackKind::AiGenerated
        } else if self.track_type == 1 {
            TrackKind::ClosedCaption
        } else {
            TrackKind::Human
        }
    }

    fn into_track(self) -> SubtitleTrack {
        let kind = self.kind();
        SubtitleTrack {
            id: self.id,
            lan: self.lan,
            lan_doc: self.lan_doc,
            kind,
            url: self.subtitle_url,
        }
    }
}

/// List the subtitle tracks of a video.
/// Tries the signed player endpoint keyed by aid then bvid, then the
/// unsigned endpoint, because accounts and risk-control environments
/// differ in which variant answers. A video without subtitles yields an
/// empty list, not an error.
pub async fn list_tracks(client: &BiliClient, video: &VideoRef) -> Result<Vec<SubtitleTrack>> {
    let aid_params = vec![
        ("aid".to_string(), video.aid.to_string()),
        ("cid".to_string(), video.cid.to_string()),
    ];
    let bvid_params = vec![
        ("bvid".to_string(), video.bvid.clone()),
        ("cid".to_string(), video.cid.to_string()),
    ];
    let candidates = [
        (PLAYER_WBI_PATH, &aid_params, true),
        (PLAYER_WBI_PATH, &bvid_params, true),
        (PLAYER_PATH, &aid_params, false),
        (PLAYER_PATH, &bvid_params, false),
    ];

    let mut saw_success = false;
    let mut last_err: Option<Error> = None;
    for (path, params, signed) in candidates {
        trace!("listing tracks via {path} signed={signed}");
        let result = if signed {
            client.get_api_signed::<PlayerData>(path, params).await
        } else {
            client.get_api::<PlayerData>(path, params).await
        };
        match result {
            Ok(envelope) if classify(envelope.code) == ApiStatus::Success => {
                saw_success = true;
                let tracks: Vec<SubtitleTrack> = envelope
                    .data
                    .map(|d| d.subtitle.subtitles)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|t| !t.subtitle_url.is_empty())
                    .map(RawTrack::into_track)
                    .collect();
                if !tracks.is_empty() {
                    debug!("found {} track(s) via {path}", tracks.len());
                    return Ok(tracks);
                }
            }
            Ok(envelope) => {
                last_err = Some(envelope_error(envelope.code, &envelope.message, &video.bvid));
            }
            Err(err) => last_err = Some(err),
        }
    }

    if saw_success {
        info!("video {} has no subtitle tracks", video.bvid);
        Ok(Vec::new())
    } else {
        Err(last_err.unwrap_or(Error::Platform {
            code: 0,
            message: "no player endpoint answered".to_string(),
        }))
    }
}

/// Pick the track to download: AI-generated tracks win, and among several
/// AI languages the preferred one if configured, else the first returned.
/// The first-returned tiebreak is a policy default, not a platform
/// contract.
pub fn select_track<'a>(
    tracks: &'a [SubtitleTrack],
    preferred_lang: Option<&str>,
) -> Option<&'a SubtitleTrack> {
    let ai: Vec<&SubtitleTrack> = tracks
        .iter()
        .filter(|t| t.kind == TrackKind::AiGenerated)
        .collect();
    if let Some(pref) = preferred_lang {
        if let Some(track) = ai.iter().find(|t| lang_matches(&t.lan, pref)) {
            return Some(track);
        }
    }
    ai.first().copied().or_else(|| tracks.first())
}

/// Match a track language code against a preferred language, ignoring the
/// `ai-` prefix AI tracks carry.
fn lang_matches(lan: &str, pref: &str) -> bool {
    lan == pref || lan.strip_prefix("ai-") == Some(pref)
}

/// Normalize scheme-relative and path-relative CDN URLs.
fn normalize_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else if url.starts_with('/') {
        format!("{SUBTITLE_CDN}{url}")
    } else {
        url.to_string()
    }
}

/// Download and parse a track payload.
/// A 403 means the session lacks the membership tier for AI subtitles or
/// the auth key expired, surfaced as `AuthInvalid` rather than a generic
/// fetch failure.
pub async fn fetch_content(
    client: &BiliClient,
    video_id: &str,
    track: &SubtitleTrack,
) -> Result<SubtitleContent> {
    let url = normalize_url(&track.url);
    debug!("downloading track {} of {video_id}", track.id);

    let resp = client.get(&url, &[]).await.map_err(|err| match err {
        Error::Transport(e) => Error::SubtitleFetch {
            video_id: video_id.to_string(),
            track_id: track.id,
            reason: e.to_string(),
        },
        other => other,
    })?;

    let status = resp.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(Error::AuthInvalid(format!(
            "subtitle CDN rejected track {} of {video_id} with {status}",
            track.id
        )));
    }
    if !status.is_success() {
        return Err(Error::SubtitleFetch {
            video_id: video_id.to_string(),
            track_id: track.id,
            reason: format!("http status {status}"),
        });
    }

    let text = resp.text().await.map_err(|e| Error::SubtitleFetch {
        video_id: video_id.to_string(),
        track_id: track.id,
        reason: e.to_string(),
    })?;
    let payload: RawPayload = serde_json::from_str(&text).map_err(|e| {
        Error::SubtitleFormat(format!("track {} of {video_id}: {e}", track.id))
    })?;

    let mut segments: Vec<Segment> = payload
        .body
        .into_iter()
        .map(|s| Segment {
            start_ms: (s.from.max(0.0) * 1000.0).round() as u64,
            end_ms: (s.to.max(0.0) * 1000.0).round() as u64,
            text: s.content,
        })
        .collect();
    segments.sort_by_key(|s| s.start_ms);

    Ok(SubtitleContent {
        video_id: video_id.to_string(),
        track_id: track.id,
        segments,
    })
}
