//! Loading and normalizing Bilibili session credentials.
//! Credentials come from an inline cookie header or an exported cookie file
//! and are read once at startup; they are never written back to disk.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Cookie names that carry the platform login state.
const SESSION_COOKIE: &str = "SESSDATA";
const CSRF_COOKIE: &str = "bili_jct";
const USER_ID_COOKIE: &str = "DedeUserID";

/// Export file names probed when no explicit path is configured.
const COOKIE_FILE_CANDIDATES: &[&str] = &["key.json", "cookies.json", "bilibili_cookies.json"];

/// Where credentials may come from. Both fields are optional; `load`
/// fails if neither yields a session token.
#[derive(Debug, Default, Clone)]
pub struct CredentialSource {
    /// A whole `Cookie:` header value copied from the browser.
    pub inline_cookie: Option<String>,
    /// Path to a browser cookie-export JSON file.
    pub cookie_file: Option<PathBuf>,
}

/// Normalized session credentials, immutable once loaded.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    /// The platform session token. Always non-empty.
    pub sessdata: String,
    /// CSRF token, present when the export included it.
    pub bili_jct: Option<String>,
    /// Numeric user id, present when the export included it.
    pub user_id: Option<String>,
    /// The full cookie header sent with authenticated requests.
    pub raw_cookie_header: String,
}

/// One entry of a browser cookie-export JSON file.
#[derive(Debug, Deserialize)]
struct CookieExportEntry {
    #[serde(default)]
    domain: String,
    name: String,
    value: String,
}

impl CredentialSource {
    /// Load a credential bundle from the configured sources.
    /// The inline header wins; the cookie file is consulted only when the
    /// header is absent or holds no session token.
    pub fn load(&self) -> Result<CredentialBundle> {
        let mut cookies = self
            .inline_cookie
            .as_deref()
            .map(parse_cookie_header)
            .unwrap_or_default();

        if !cookies.contains_key(SESSION_COOKIE) {
            if let Some(path) = self.resolve_cookie_file() {
                debug!("loading cookies from {}", path.display());
                let file_cookies = load_cookie_file(&path)?;
                for (name, value) in file_cookies {
                    cookies.entry(name).or_insert(value);
                }
            }
        }

        let sessdata = cookies
            .get(SESSION_COOKIE)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| {
                Error::AuthConfig(
                    "no SESSDATA cookie found; configure an inline cookie header \
                     or a cookie-export file"
                        .to_string(),
                )
            })?;

        let raw_cookie_header = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        Ok(CredentialBundle {
            sessdata,
            bili_jct: cookies.get(CSRF_COOKIE).cloned(),
            user_id: cookies.get(USER_ID_COOKIE).cloned(),
            raw_cookie_header,
        })
    }

    /// Pick the cookie file to read: the explicit path if configured,
    /// otherwise the first conventional export name present in the
    /// working directory.
    fn resolve_cookie_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cookie_file {
            return Some(path.clone());
        }
        COOKIE_FILE_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }
}

/// Parse a `Cookie:` header value into name/value pairs.
/// Malformed fragments without `=` are skipped.
fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
    trace!("parse_cookie_header len={}", header.len());
    let mut parsed = BTreeMap::new();
    for piece in header.split(';') {
        let piece = piece.trim();
        if let Some((name, value)) = piece.split_once('=') {
            let name = name.trim();
            let value = value.trim();
            if !name.is_empty() && !value.is_empty() {
                parsed.insert(name.to_string(), value.to_string());
            }
        }
    }
    parsed
}

/// Read a browser cookie-export JSON file, keeping only cookies scoped to
/// the platform domain.
fn load_cookie_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::AuthConfig(format!("cannot read {}: {e}", path.display())))?;
    let entries: Vec<CookieExportEntry> = serde_json::from_str(&text)
        .map_err(|e| Error::AuthConfig(format!("{} is not a cookie export: {e}", path.display())))?;

    let mut parsed = BTreeMap::new();
    for entry in entries {
        if !entry.domain.contains("bilibili.com") {
            continue;
        }
        let name = entry.name.trim();
        let value = entry.value.trim();
        if !name.is_empty() && !value.is_empty() {
            parsed.insert(name.to_string(), value.to_string());
        }
    }
    Ok(parsed)
}
