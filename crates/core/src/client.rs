//! Authenticated, signed HTTP access to the platform API.
//! This wraps `reqwest` with browser-like headers, bounded retries for
//! transient transport failures and classification of platform error codes.

use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::credentials::CredentialBundle;
use crate::error::{Error, Result};
use crate::wbi::{self, WbiKeys};

const API_BASE: &str = "https://api.bilibili.com";
const NAV_PATH: &str = "/x/web-interface/nav";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_LIMIT: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const REFERER: &str = "https://www.bilibili.com";

/// The envelope every platform API response is wrapped in.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// Classification of the platform's embedded status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    Success,
    AuthRequired,
    RateLimited,
    NotFound,
    Unknown,
}

/// Map a platform status code to its classification.
pub fn classify(code: i64) -> ApiStatus {
    match code {
        0 => ApiStatus::Success,
        -101 | -111 => ApiStatus::AuthRequired,
        -352 | -412 => ApiStatus::RateLimited,
        -404 | 62002 | 62004 => ApiStatus::NotFound,
        _ => ApiStatus::Unknown,
    }
}

/// Turn a non-success envelope into the matching error kind.
/// `video_id` provides context for not-found reports.
pub(crate) fn envelope_error(code: i64, message: &str, video_id: &str) -> Error {
    match classify(code) {
        ApiStatus::AuthRequired => Error::AuthInvalid(format!("platform code {code}: {message}")),
        ApiStatus::RateLimited => Error::RateLimited { code },
        ApiStatus::NotFound => Error::VideoNotFound {
            id: video_id.to_string(),
            code,
        },
        _ => Error::Platform {
            code,
            message: message.to_string(),
        },
    }
}

/// Nav endpoint payload: login state plus the WBI key fragments.
#[derive(Debug, Deserialize)]
struct NavData {
    #[serde(rename = "isLogin", default)]
    is_login: bool,
    wbi_img: Option<wbi::WbiImg>,
}

/// Current wall-clock time in milliseconds, used as the signing timestamp.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The platform API client. Owns the session credentials and the lazily
/// fetched signing key pair; safe to share behind a reference.
pub struct BiliClient {
    http: reqwest::Client,
    bundle: CredentialBundle,
    api_base: String,
    wbi_keys: OnceCell<WbiKeys>,
}

impl BiliClient {
    /// Build a client around a loaded credential bundle.
    pub fn new(bundle: CredentialBundle) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            bundle,
            api_base: API_BASE.to_string(),
            wbi_keys: OnceCell::new(),
        })
    }

    /// Point the client at a different API host. Used by tests.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Issue a GET with browser-like headers and the session cookie,
    /// retrying transient transport failures with exponential backoff.
    /// Platform-level errors are not inspected here.
    pub(crate) async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Response> {
        let mut attempt = 0;
        loop {
            trace!("GET {url} attempt={attempt}");
            let result = self
                .http
                .get(url)
                .query(params)
                .header("User-Agent", USER_AGENT)
                .header("Accept", "application/json, text/plain, */*")
                .header("Referer", REFERER)
                .header("Origin", REFERER)
                .header("Cookie", &self.bundle.raw_cookie_header)
                .send()
                .await;
            match result {
                Ok(resp) => return Ok(resp),
                Err(err) if attempt + 1 < RETRY_LIMIT && (err.is_timeout() || err.is_connect()) => {
                    let backoff = RETRY_BACKOFF * 2u32.pow(attempt);
                    warn!("transient failure on {url}: {err}; retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Call an unsigned API endpoint and decode the response envelope.
    pub(crate) async fn get_api<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<ApiEnvelope<T>> {
        let url = format!("{}{path}", self.api_base);
        let resp = self.get(&url, params).await?;
        let status = resp.status();
        if status.as_u16() == 412 {
            return Err(Error::RateLimited {
                code: i64::from(status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(Error::Platform {
                code: i64::from(status.as_u16()),
                message: format!("http status {status} from {path}"),
            });
        }
        Ok(resp.json().await?)
    }

    /// Call a WBI endpoint: the params are signed with the cached key pair
    /// before the request goes out.
    pub(crate) async fn get_api_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<ApiEnvelope<T>> {
        let keys = self.wbi_keys().await?;
        let signed = wbi::sign(params, keys, now_ms());
        self.get_api(path, &signed).await
    }

    /// The signing key pair, fetched from the nav endpoint on first use and
    /// cached for the process lifetime. Concurrent callers share one fetch.
    pub async fn wbi_keys(&self) -> Result<&WbiKeys> {
        self.wbi_keys
            .get_or_try_init(|| async {
                debug!("fetching WBI key fragments");
                let envelope: ApiEnvelope<NavData> = self
                    .get_api(NAV_PATH, &[])
                    .await
                    .map_err(|e| Error::SignatureBootstrap(e.to_string()))?;
                // The nav endpoint reports "not logged in" for anonymous
                // sessions but still carries the key fragments.
                let wbi_img = envelope
                    .data
                    .and_then(|d| d.wbi_img)
                    .ok_or_else(|| {
                        Error::SignatureBootstrap("nav response carries no wbi_img".to_string())
                    })?;
                WbiKeys::from_nav(&wbi_img)
            })
            .await
    }

    /// Probe the platform to check that the session is accepted.
    pub async fn validate_session(&self) -> Result<()> {
        let envelope: ApiEnvelope<NavData> = self.get_api(NAV_PATH, &[]).await?;
        let logged_in = envelope.code == 0 && envelope.data.map(|d| d.is_login).unwrap_or(false);
        if !logged_in {
            return Err(Error::AuthInvalid(format!(
                "platform reports the session logged out (code {})",
                envelope.code
            )));
        }
        Ok(())
    }
}
