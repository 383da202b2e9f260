//! End-to-end orchestration: resolve, locate, fetch, render.
//! One video is processed at a time; the fetch cache and the retained raw
//! payloads let a repeat invocation skip network and render work entirely.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::cache::SubtitleCache;
use crate::client::BiliClient;
use crate::convert::{self, Format};
use crate::error::Result;
use crate::resolver::{self, VideoRef};
use crate::subtitle::{self, SubtitleContent, SubtitleTrack};

/// The result of one pipeline run.
#[derive(Debug)]
pub enum Outcome {
    Subtitle(SubtitleOutput),
    /// The video exists but legitimately has no subtitle tracks.
    NoSubtitles { video: VideoRef },
}

/// A rendered subtitle plus the structured content collaborators consume.
#[derive(Debug, Clone)]
pub struct SubtitleOutput {
    pub video: VideoRef,
    pub track: SubtitleTrack,
    pub content: SubtitleContent,
    pub rendered: String,
    /// False when the raw payload was reused from a previous run.
    pub fetched_from_network: bool,
    /// False when the rendered text was reused from a previous run.
    pub rendered_fresh: bool,
}

/// Everything retained for a processed video, backing cache short-circuits.
struct VideoState {
    video: VideoRef,
    track: SubtitleTrack,
    content: SubtitleContent,
    rendered: HashMap<Format, String>,
}

/// The subtitle pipeline. Owns the client, the advisory cache and the
/// retained payloads of this run.
pub struct Pipeline<C: SubtitleCache> {
    client: BiliClient,
    cache: C,
    preferred_lang: Option<String>,
    states: HashMap<String, VideoState>,
}

impl<C: SubtitleCache> Pipeline<C> {
    pub fn new(client: BiliClient, cache: C) -> Self {
        Self {
            client,
            cache,
            preferred_lang: None,
            states: HashMap::new(),
        }
    }

    /// Prefer this language when a video carries several AI tracks.
    pub fn with_preferred_lang(mut self, lang: Option<String>) -> Self {
        self.preferred_lang = lang;
        self
    }

    /// Fetch and render the subtitles of one video.
    /// When the cache marks the raw payload present and this run still
    /// holds it, no network call is made; when it also marks the format
    /// rendered, the render is skipped too.
    pub async fn run(&mut self, input: &str, format: Format) -> Result<Outcome> {
        let canonical = resolver::extract_id(input)?;

        if let Some(mut state) = self.states.remove(&canonical) {
            let raw_cached = self
                .cache
                .get(&canonical, state.track.id)
                .map(|r| r.raw_present)
                .unwrap_or(false);
            if raw_cached {
                debug!("raw payload of {canonical} cached, skipping network");
                let (rendered, fresh) = Self::render_cached(&mut self.cache, &mut state, format);
                let output = SubtitleOutput {
                    video: state.video.clone(),
                    track: state.track.clone(),
                    content: state.content.clone(),
                    rendered,
                    fetched_from_network: false,
                    rendered_fresh: fresh,
                };
                self.states.insert(canonical, state);
                return Ok(Outcome::Subtitle(output));
            }
            // The cache record went missing or stale; refetch.
            self.states.insert(canonical.clone(), state);
        }

        let video = resolver::resolve(&self.client, input).await?;
        let tracks = subtitle::list_tracks(&self.client, &video).await?;
        let Some(track) =
            subtitle::select_track(&tracks, self.preferred_lang.as_deref()).cloned()
        else {
            info!("no subtitles available for {}", video.bvid);
            return Ok(Outcome::NoSubtitles { video });
        };

        let content = subtitle::fetch_content(&self.client, &canonical, &track).await?;
        self.cache.record_raw_fetched(&canonical, track.id);
        let mut state = VideoState {
            video,
            track,
            content,
            rendered: HashMap::new(),
        };
        let (rendered, fresh) = Self::render_cached(&mut self.cache, &mut state, format);
        let output = SubtitleOutput {
            video: state.video.clone(),
            track: state.track.clone(),
            content: state.content.clone(),
            rendered,
            fetched_from_network: true,
            rendered_fresh: fresh,
        };
        self.states.insert(canonical, state);
        Ok(Outcome::Subtitle(output))
    }

    /// Render a format for a retained track, reusing the previous output
    /// when the cache marks it present. Returns the text and whether a
    /// fresh render happened.
    fn render_cached(cache: &mut C, state: &mut VideoState, format: Format) -> (String, bool) {
        let already_rendered = cache
            .get(&state.content.video_id, state.track.id)
            .map(|r| r.has_rendered(format))
            .unwrap_or(false);
        if already_rendered {
            if let Some(text) = state.rendered.get(&format) {
                debug!("{format} render of {} cached, skipping", state.content.video_id);
                return (text.clone(), false);
            }
        }
        let text = convert::render(&state.content, format);
        state.rendered.insert(format, text.clone());
        cache.record_rendered(&state.content.video_id, state.track.id, format);
        (text, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::credentials::CredentialBundle;
    use httpmock::prelude::*;
    use httpmock::Mock;
    use serde_json::json;

    fn test_client(base: &str) -> BiliClient {
        let bundle = CredentialBundle {
            sessdata: "t".to_string(),
            bili_jct: None,
            user_id: None,
            raw_cookie_header: "SESSDATA=t".to_string(),
        };
        BiliClient::new(bundle).unwrap().with_api_base(base)
    }

    struct PlatformMocks<'a> {
        nav: Mock<'a>,
        view: Mock<'a>,
        player: Mock<'a>,
        cdn: Mock<'a>,
    }

    /// Stand up the whole endpoint family for one video with one AI track.
    fn mock_platform(server: &MockServer) -> PlatformMocks<'_> {
        let nav = server.mock(|when, then| {
            when.method(GET).path("/x/web-interface/nav");
            then.status(200).json_body(json!({
                "code": 0,
                "data": {
                    "isLogin": true,
                    "wbi_img": {
                        "img_url": "https://i0.hdslb.com/bfs/wbi/7cd084941338484aae1ad9425b84077c.png",
                        "sub_url": "https://i0.hdslb.com/bfs/wbi/4932caff0ff746eab6f01bf08b70ac45.png"
                    }
                }
            }));
        });
        let view = server.mock(|when, then| {
            when.method(GET).path("/x/web-interface/view");
            then.status(200).json_body(json!({
                "code": 0,
                "data": {
                    "bvid": "BV1xx411c7mD", "aid": 170001, "cid": 279786,
                    "title": "test", "duration": 60
                }
            }));
        });
        let subtitle_url = format!("{}/bfs/ai_subtitle/prod/1", server.base_url());
        let player = server.mock(move |when, then| {
            when.method(GET).path("/x/player/wbi/v2");
            then.status(200).json_body(json!({
                "code": 0,
                "data": {"subtitle": {"subtitles": [
                    {"id": 7, "lan": "ai-zh", "lan_doc": "中文（自动生成）",
                     "ai_type": 1, "subtitle_url": subtitle_url}
                ]}}
            }));
        });
        let cdn = server.mock(|when, then| {
            when.method(GET).path("/bfs/ai_subtitle/prod/1");
            then.status(200).json_body(json!({
                "body": [
                    {"from": 0.0, "to": 1.0, "content": "hello"},
                    {"from": 1.0, "to": 2.0, "content": "world"}
                ]
            }));
        });
        PlatformMocks {
            nav,
            view,
            player,
            cdn,
        }
    }

    #[tokio::test]
    async fn runs_the_full_pipeline() {
        let server = MockServer::start();
        let mocks = mock_platform(&server);
        let mut pipeline = Pipeline::new(test_client(&server.base_url()), MemoryCache::new());

        let outcome = pipeline
            .run("https://www.bilibili.com/video/BV1xx411c7mD", Format::Srt)
            .await
            .unwrap();
        let Outcome::Subtitle(output) = outcome else {
            panic!("expected subtitles");
        };
        assert_eq!(output.track.id, 7);
        assert!(output.fetched_from_network);
        assert!(output.rendered_fresh);
        assert!(output.rendered.starts_with("1\n00:00:00,000 --> 00:00:01,000\nhello"));
        mocks.view.assert_hits(1);
        mocks.cdn.assert_hits(1);
    }

    #[tokio::test]
    async fn warm_cache_skips_network_and_render() {
        let server = MockServer::start();
        let mocks = mock_platform(&server);
        let mut pipeline = Pipeline::new(test_client(&server.base_url()), MemoryCache::new());

        let first = pipeline.run("BV1xx411c7mD", Format::Srt).await.unwrap();
        let second = pipeline.run("BV1xx411c7mD", Format::Srt).await.unwrap();

        let (Outcome::Subtitle(first), Outcome::Subtitle(second)) = (first, second) else {
            panic!("expected subtitles");
        };
        assert!(!second.fetched_from_network);
        assert!(!second.rendered_fresh);
        assert_eq!(first.rendered, second.rendered);
        // Exactly one call per endpoint across both runs.
        mocks.nav.assert_hits(1);
        mocks.view.assert_hits(1);
        mocks.player.assert_hits(1);
        mocks.cdn.assert_hits(1);
    }

    #[tokio::test]
    async fn new_format_renders_without_refetching() {
        let server = MockServer::start();
        let mocks = mock_platform(&server);
        let mut pipeline = Pipeline::new(test_client(&server.base_url()), MemoryCache::new());

        pipeline.run("BV1xx411c7mD", Format::Srt).await.unwrap();
        let outcome = pipeline.run("BV1xx411c7mD", Format::Txt).await.unwrap();
        let Outcome::Subtitle(output) = outcome else {
            panic!("expected subtitles");
        };
        assert!(!output.fetched_from_network);
        assert!(output.rendered_fresh);
        assert_eq!(output.rendered, "hello\nworld\n");
        mocks.cdn.assert_hits(1);
    }

    #[tokio::test]
    async fn stale_cache_record_still_produces_output() {
        let server = MockServer::start();
        let mocks = mock_platform(&server);
        // The cache claims the payload exists, but this run holds nothing:
        // the pipeline must fall back to the network.
        let mut warm = MemoryCache::new();
        warm.record_raw_fetched("BV1xx411c7mD", 7);
        warm.record_rendered("BV1xx411c7mD", 7, Format::Srt);
        let mut pipeline = Pipeline::new(test_client(&server.base_url()), warm);

        let outcome = pipeline.run("BV1xx411c7mD", Format::Srt).await.unwrap();
        let Outcome::Subtitle(output) = outcome else {
            panic!("expected subtitles");
        };
        assert!(output.fetched_from_network);
        mocks.cdn.assert_hits(1);
    }

    #[tokio::test]
    async fn reports_no_subtitles_without_downloading() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/x/web-interface/nav");
            then.status(200).json_body(json!({
                "code": 0,
                "data": {"isLogin": true, "wbi_img": {
                    "img_url": "https://i0.hdslb.com/bfs/wbi/7cd084941338484aae1ad9425b84077c.png",
                    "sub_url": "https://i0.hdslb.com/bfs/wbi/4932caff0ff746eab6f01bf08b70ac45.png"
                }}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/x/web-interface/view");
            then.status(200).json_body(json!({
                "code": 0,
                "data": {"bvid": "BV1xx411c7mD", "aid": 170001, "cid": 1, "title": "t"}
            }));
        });
        for path in ["/x/player/wbi/v2", "/x/player/v2"] {
            server.mock(|when, then| {
                when.method(GET).path(path);
                then.status(200)
                    .json_body(json!({"code": 0, "data": {"subtitle": {"subtitles": []}}}));
            });
        }
        let mut pipeline = Pipeline::new(test_client(&server.base_url()), MemoryCache::new());
        let outcome = pipeline.run("BV1xx411c7mD", Format::Srt).await.unwrap();
        assert!(matches!(outcome, Outcome::NoSubtitles { .. }));
    }
}
