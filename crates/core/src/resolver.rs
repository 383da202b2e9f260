//! Turning arbitrary user input into a resolved video reference.
//! Identifier extraction is pure pattern matching; resolution adds one
//! metadata request for title, duration and the first page cid.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::client::{classify, envelope_error, ApiStatus, BiliClient};
use crate::error::{Error, Result};

const VIEW_PATH: &str = "/x/web-interface/view";

/// URL shapes we accept, most specific first: watch pages, short links,
/// then bare identifiers anywhere in the input.
static ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"bilibili\.com/video/(BV[0-9A-Za-z]{10}|av\d+)").unwrap(),
        Regex::new(r"b23\.tv/(BV[0-9A-Za-z]{10}|av\d+)").unwrap(),
        Regex::new(r"(BV[0-9A-Za-z]{10}|av\d+)").unwrap(),
    ]
});

/// A resolved video, immutable once built.
#[derive(Debug, Clone)]
pub struct VideoRef {
    /// The input string the reference was resolved from.
    pub raw_input: String,
    /// Canonical `BV` identifier reported by the platform.
    pub bvid: String,
    /// Numeric identifier, used for signed player queries.
    pub aid: i64,
    /// Content id of the first page; subtitle queries are per-cid.
    pub cid: i64,
    pub title: String,
    pub duration_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    bvid: String,
    aid: i64,
    cid: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    cid: i64,
}

/// Extract a canonical video identifier from a URL or bare id.
/// Accepts watch-page URLs, `b23.tv` short links and bare `BV…`/`av…` ids.
pub fn extract_id(input: &str) -> Result<String> {
    let trimmed = input.trim();
    for pattern in ID_PATTERNS.iter() {
        if let Some(cap) = pattern.captures(trimmed) {
            return Ok(cap[1].to_string());
        }
    }
    Err(Error::InvalidReference {
        input: input.to_string(),
    })
}

/// Resolve `input` into a `VideoRef` by extracting the identifier and
/// fetching the video metadata.
pub async fn resolve(client: &BiliClient, input: &str) -> Result<VideoRef> {
    let id = extract_id(input)?;
    debug!("resolving {id}");

    let params = if let Some(aid) = id.strip_prefix("av") {
        vec![("aid".to_string(), aid.to_string())]
    } else {
        vec![("bvid".to_string(), id.clone())]
    };

    let envelope = client.get_api::<ViewData>(VIEW_PATH, &params).await?;
    if classify(envelope.code) != ApiStatus::Success {
        return Err(envelope_error(envelope.code, &envelope.message, &id));
    }
    let data = envelope.data.ok_or(Error::Platform {
        code: envelope.code,
        message: "view response carries no data".to_string(),
    })?;

    // Multi-page videos list their parts; the first page owns the
    // subtitles we are after, matching the platform player default.
    let cid = data.pages.first().map(|p| p.cid).unwrap_or(data.cid);
    Ok(VideoRef {
        raw_input: input.to_string(),
        bvid: data.bvid,
        aid: data.aid,
        cid,
        title: data.title,
        duration_secs: data.duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialBundle;
    use httpmock::prelude::*;
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

    #[test]
    fn extracts_id_from_all_shapes() {
        let cases = [
            "https://www.bilibili.com/video/BV1xx411c7mD?p=1",
            "https://b23.tv/BV1xx411c7mD",
            "BV1xx411c7mD",
            "  BV1xx411c7mD  ",
        ];
        for case in cases {
            assert_eq!(extract_id(case).unwrap(), "BV1xx411c7mD", "case {case:?}");
        }
        assert_eq!(
            extract_id("https://www.bilibili.com/video/av170001").unwrap(),
            "av170001"
        );
        assert_eq!(extract_id("av170001").unwrap(), "av170001");
    }

    #[test]
    fn rejects_unparseable_input() {
        assert!(matches!(
            extract_id("https://example.com/watch?v=nope"),
            Err(Error::InvalidReference { .. })
        ));
        assert!(matches!(extract_id(""), Err(Error::InvalidReference { .. })));
    }

    #[tokio::test]
    async fn resolves_video_metadata() {
        let server = MockServer::start();
        let view = server.mock(|when, then| {
            when.method(GET)
                .path(VIEW_PATH)
                .query_param("bvid", "BV1xx411c7mD");
            then.status(200).json_body(json!({
                "code": 0,
                "message": "0",
                "data": {
                    "bvid": "BV1xx411c7mD",
                    "aid": 170001,
                    "cid": 279786,
                    "title": "test video",
                    "duration": 120,
                    "pages": [{"cid": 279786}, {"cid": 279787}]
                }
            }));
        });
        let client = test_client(&server.base_url());
        let video = resolve(&client, "https://www.bilibili.com/video/BV1xx411c7mD")
            .await
            .unwrap();
        view.assert();
        assert_eq!(video.bvid, "BV1xx411c7mD");
        assert_eq!(video.aid, 170001);
        assert_eq!(video.cid, 279786);
        assert_eq!(video.title, "test video");
        assert_eq!(video.duration_secs, 120);
    }

    #[tokio::test]
    async fn av_ids_query_by_aid() {
        let server = MockServer::start();
        let view = server.mock(|when, then| {
            when.method(GET).path(VIEW_PATH).query_param("aid", "170001");
            then.status(200).json_body(json!({
                "code": 0,
                "message": "0",
                "data": {"bvid": "BV1xx411c7mD", "aid": 170001, "cid": 1, "title": "t"}
            }));
        });
        let client = test_client(&server.base_url());
        let video = resolve(&client, "av170001").await.unwrap();
        view.assert();
        assert_eq!(video.bvid, "BV1xx411c7mD");
        assert_eq!(video.cid, 1);
    }

    #[tokio::test]
    async fn absent_video_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(VIEW_PATH);
            then.status(200)
                .json_body(json!({"code": -404, "message": "啥都木有", "data": null}));
        });
        let client = test_client(&server.base_url());
        let err = resolve(&client, "BV1xx411c7mD").await.unwrap_err();
        assert!(matches!(err, Error::VideoNotFound { code: -404, .. }));
    }
}
