//! The platform's WBI request-signing scheme.
//! Two raw key fragments fetched from the nav endpoint are permuted into a
//! 32-character mixing key; signing is a pure function over the params, the
//! key pair and a caller-supplied timestamp, so it can be pinned by fixtures.

use serde::Deserialize;
use std::time::SystemTime;
use tracing::trace;
use url::form_urlencoded;

use crate::error::{Error, Result};

/// Fixed permutation applied to the 64-character concatenation of the two
/// key fragments before truncating to 32 characters.
pub const MIXIN_KEY_TABLE: [usize; 64] = [
    46, 47, 18, 2, 53, 8, 23, 32, 15, 50, 10, 31, 58, 3, 45, 35, 27, 43, 5, 49, 33, 9, 42, 19, 29,
    28, 14, 39, 12, 38, 41, 13, 37, 48, 7, 16, 24, 55, 40, 61, 26, 17, 0, 1, 60, 51, 30, 4, 22,
    25, 54, 21, 56, 59, 6, 63, 57, 62, 11, 36, 20, 34, 44, 52,
];

/// Characters stripped from parameter values before serialization.
const FILTERED_VALUE_CHARS: &[char] = &['!', '\'', '(', ')', '*'];

/// The pair of raw signing key fragments, fetched once per process run.
#[derive(Debug, Clone)]
pub struct WbiKeys {
    pub img_key: String,
    pub sub_key: String,
    pub fetched_at: SystemTime,
}

/// The `wbi_img` object of the nav response carrying the key fragments as
/// fake image URLs.
#[derive(Debug, Deserialize)]
pub(crate) struct WbiImg {
    img_url: String,
    sub_url: String,
}

impl WbiKeys {
    /// Build the key pair from the two nav URLs.
    /// Fails when either URL does not carry a 32-character hex file stem.
    pub(crate) fn from_nav(wbi_img: &WbiImg) -> Result<Self> {
        Ok(Self {
            img_key: key_fragment(&wbi_img.img_url)?,
            sub_key: key_fragment(&wbi_img.sub_url)?,
            fetched_at: SystemTime::now(),
        })
    }

    /// Derive the 32-character mixing key from the two fragments.
    pub fn mixin_key(&self) -> String {
        mixin_key(&self.img_key, &self.sub_key)
    }
}

/// Extract the key fragment from a nav URL such as
/// `https://i0.hdslb.com/bfs/wbi/7cd0...77c.png`.
fn key_fragment(url: &str) -> Result<String> {
    let file = url.rsplit('/').next().unwrap_or(url);
    let stem = file.split('.').next().unwrap_or(file);
    if stem.len() != 32 || !stem.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::SignatureBootstrap(format!(
            "nav key url {url:?} has no 32-char hex stem"
        )));
    }
    Ok(stem.to_string())
}

/// Permute the concatenated fragments by `MIXIN_KEY_TABLE` and truncate.
pub fn mixin_key(img_key: &str, sub_key: &str) -> String {
    let raw: Vec<char> = img_key.chars().chain(sub_key.chars()).collect();
    MIXIN_KEY_TABLE
        .iter()
        .take(32)
        .filter_map(|&i| raw.get(i))
        .collect()
}

/// Sign `params` for a WBI endpoint.
/// Appends a `wts` millisecond timestamp, serializes the params in ascending
/// key order with filtered values, and appends the `w_rid` MD5 signature.
/// Pure given its inputs; the same params at a different timestamp produce a
/// different signature.
pub fn sign(params: &[(String, String)], keys: &WbiKeys, now_ms: u64) -> Vec<(String, String)> {
    let mut signed: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.clone(), sanitize_value(v)))
        .collect();
    signed.push(("wts".to_string(), now_ms.to_string()));
    signed.sort_by(|a, b| a.0.cmp(&b.0));

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &signed {
        serializer.append_pair(key, value);
    }
    let query = serializer.finish();
    let digest = md5::compute(format!("{query}{}", keys.mixin_key()));
    trace!("signed {} params", signed.len());

    signed.push(("w_rid".to_string(), format!("{digest:x}")));
    signed
}

/// Drop the characters the platform refuses in signed values.
fn sanitize_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !FILTERED_VALUE_CHARS.contains(c))
        .collect()
}
