//! Cookie middleware.
//!
//! A [`CookieJar`] accumulates cookies from `Set-Cookie` response
//! headers and injects a `Cookie` header into matching requests. The
//! jar is shared: clone the `Arc` to let several transports see one
//! session. Matching is by domain suffix and path prefix; expiry
//! handling is limited to `Max-Age=0` removal, everything else lives
//! for the life of the jar.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderValue;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::handler::HttpHandler;
use crate::message::{Request, Response};

// ============================================================================
// Cookie
// ============================================================================

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie applies to (no leading dot).
    pub domain: String,
    /// Path prefix the cookie applies to.
    pub path: String,
}

impl Cookie {
    fn matches(&self, host: &str, path: &str) -> bool {
        let domain_ok =
            host == self.domain || host.ends_with(&format!(".{}", self.domain));
        domain_ok && path.starts_with(&self.path)
    }

    fn same_slot(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

// ============================================================================
// CookieJar
// ============================================================================

/// Thread-safe cookie store shared across handlers.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<Vec<Cookie>>,
}

impl CookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of every stored cookie.
    #[must_use]
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.lock().clone()
    }

    /// Inserts or replaces a cookie.
    pub fn store(&self, cookie: Cookie) {
        let mut cookies = self.cookies.lock();
        if let Some(slot) = cookies.iter_mut().find(|c| c.same_slot(&cookie)) {
            slot.value = cookie.value;
        } else {
            cookies.push(cookie);
        }
    }

    /// Removes the cookie occupying the same name/domain/path slot.
    pub fn remove(&self, cookie: &Cookie) {
        self.cookies.lock().retain(|c| !c.same_slot(cookie));
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.cookies.lock().clear();
    }

    /// Builds the `Cookie` header value for a request URL.
    #[must_use]
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let path = url.path();

        let cookies = self.cookies.lock();
        let mut pairs: Vec<String> = cookies
            .iter()
            .filter(|c| c.matches(host, path))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            pairs.sort();
            Some(pairs.join("; "))
        }
    }

    /// Ingests every `Set-Cookie` header of a response.
    pub fn store_from_response(&self, response: &Response) {
        let Some(host) = response.url.host_str() else {
            return;
        };
        for value in response.headers.get_all(http::header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let Some((cookie, remove)) = parse_set_cookie(host, raw) else {
                continue;
            };
            if remove {
                debug!(name = %cookie.name, domain = %cookie.domain, "Removing cookie");
                self.remove(&cookie);
            } else {
                self.store(cookie);
            }
        }
    }
}

/// Parses one `Set-Cookie` value. Returns the cookie and whether it is
/// a removal (`Max-Age=0`).
fn parse_set_cookie(default_domain: &str, raw: &str) -> Option<(Cookie, bool)> {
    let mut parts = raw.split(';');

    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut domain = default_domain.to_owned();
    let mut path = "/".to_owned();
    let mut remove = false;
    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr.trim(), ""),
        };
        if key.eq_ignore_ascii_case("domain") && !val.is_empty() {
            domain = val.trim_start_matches('.').to_owned();
        } else if key.eq_ignore_ascii_case("path") && !val.is_empty() {
            path = val.to_owned();
        } else if key.eq_ignore_ascii_case("max-age") {
            remove = val.parse::<i64>().map(|age| age <= 0).unwrap_or(false);
        }
    }

    Some((
        Cookie {
            name: name.to_owned(),
            value: value.trim().to_owned(),
            domain,
            path,
        },
        remove,
    ))
}

// ============================================================================
// CookieHandler
// ============================================================================

/// Injects and collects cookies around the inner handler.
pub struct CookieHandler<H> {
    inner: H,
    jar: Arc<CookieJar>,
}

impl<H> CookieHandler<H> {
    /// Wraps `inner` with a shared jar.
    #[must_use]
    pub fn new(inner: H, jar: Arc<CookieJar>) -> Self {
        Self { inner, jar }
    }

    /// The shared jar.
    #[inline]
    #[must_use]
    pub fn jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }
}

#[async_trait]
impl<H> HttpHandler for CookieHandler<H>
where
    H: HttpHandler,
{
    async fn send(&self, mut request: Request, cancel: &CancellationToken) -> Result<Response> {
        if let Some(header) = self.jar.header_for(&request.url) {
            if let Ok(value) = HeaderValue::try_from(header) {
                request.headers.insert(http::header::COOKIE, value);
            }
        }

        let response = self.inner.send(request, cancel).await?;
        self.jar.store_from_response(&response);
        Ok(response)
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use http::StatusCode;

    struct SetCookieServer {
        set_cookie: Vec<&'static str>,
    }

    #[async_trait]
    impl HttpHandler for SetCookieServer {
        async fn send(&self, request: Request, _cancel: &CancellationToken) -> Result<Response> {
            let echoed = request
                .headers
                .get(http::header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_owned();

            let mut response = Response::new(request.url, StatusCode::OK).with_body(echoed);
            for value in &self.set_cookie {
                response.headers.append(
                    http::header::SET_COOKIE,
                    HeaderValue::from_static(value),
                );
            }
            Ok(response)
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid url")
    }

    #[tokio::test]
    async fn test_cookies_round_trip() {
        let jar = CookieJar::new();
        let handler = CookieHandler::new(
            SetCookieServer {
                set_cookie: vec!["session=abc123; Path=/", "theme=dark"],
            },
            Arc::clone(&jar),
        );
        let cancel = CancellationToken::new();

        // First request carries nothing; the response fills the jar.
        let first = handler
            .send(Request::get(url("http://example.com/login")), &cancel)
            .await
            .expect("send");
        assert_eq!(first.body.text(), "");
        assert_eq!(jar.cookies().len(), 2);

        // Second request carries both cookies.
        let second = handler
            .send(Request::get(url("http://example.com/home")), &cancel)
            .await
            .expect("send");
        assert_eq!(second.body.text(), "session=abc123; theme=dark");
    }

    #[tokio::test]
    async fn test_domain_isolation() {
        let jar = CookieJar::new();
        jar.store(Cookie {
            name: "secret".into(),
            value: "1".into(),
            domain: "example.com".into(),
            path: "/".into(),
        });

        assert!(jar.header_for(&url("http://example.com/")).is_some());
        assert!(jar.header_for(&url("http://sub.example.com/")).is_some());
        assert!(jar.header_for(&url("http://evil.com/")).is_none());
        assert!(jar.header_for(&url("http://notexample.com/")).is_none());
    }

    #[tokio::test]
    async fn test_path_prefix_match() {
        let jar = CookieJar::new();
        jar.store(Cookie {
            name: "scoped".into(),
            value: "1".into(),
            domain: "example.com".into(),
            path: "/api".into(),
        });

        assert!(jar.header_for(&url("http://example.com/api/v1")).is_some());
        assert!(jar.header_for(&url("http://example.com/other")).is_none());
    }

    #[tokio::test]
    async fn test_max_age_zero_removes() {
        let jar = CookieJar::new();
        let handler = CookieHandler::new(
            SetCookieServer {
                set_cookie: vec!["session=gone; Max-Age=0"],
            },
            Arc::clone(&jar),
        );

        jar.store(Cookie {
            name: "session".into(),
            value: "abc".into(),
            domain: "example.com".into(),
            path: "/".into(),
        });

        handler
            .send(
                Request::get(url("http://example.com/logout")),
                &CancellationToken::new(),
            )
            .await
            .expect("send");
        assert!(jar.cookies().is_empty());
    }

    #[test]
    fn test_set_cookie_attributes() {
        let (cookie, remove) =
            parse_set_cookie("example.com", "id=42; Domain=.example.com; Path=/shop; HttpOnly")
                .expect("parse");
        assert_eq!(cookie.name, "id");
        assert_eq!(cookie.value, "42");
        assert_eq!(cookie.domain, "example.com");
        assert_eq!(cookie.path, "/shop");
        assert!(!remove);
    }

    #[test]
    fn test_jar_serializes() {
        let jar = CookieJar::new();
        jar.store(Cookie {
            name: "a".into(),
            value: "1".into(),
            domain: "example.com".into(),
            path: "/".into(),
        });

        let json = serde_json::to_string(&jar.cookies()).expect("serialize");
        let restored: Vec<Cookie> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, jar.cookies());
    }
}
