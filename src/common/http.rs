//! The single HTTP capability the core requires from its host.
//!
//! Transport failures are `Err`; non-OK statuses come back as a normal
//! [`HttpResponse`] so each component can apply its own retry/fallback
//! policy as a synchronous decision (404 as absence, 5xx as retryable,
//! 429 as back-off).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{FuseError, FuseResult};

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[inline] pub fn is_ok(&self) -> bool { (200..300).contains(&self.status) }
    #[inline] pub fn is_not_found(&self) -> bool { self.status == 404 }
    #[inline] pub fn is_rate_limited(&self) -> bool { self.status == 429 }
    #[inline] pub fn is_server_error(&self) -> bool { (500..600).contains(&self.status) }

    pub fn text(&self) -> FuseResult<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| FuseError::parse(format!("non-UTF-8 response body: {e}")))
    }
}

/// Blocking HTTP capability. The host injects an implementation; the core
/// never names concrete provider URLs.
pub trait HttpFetch: Send + Sync {
    fn get(&self, url: &str) -> FuseResult<HttpResponse>;

    /// GET with an explicit Accept header (gazetteer TSV).
    fn get_with_accept(&self, url: &str, accept: &str) -> FuseResult<HttpResponse>;

    /// POST with a form/body payload (vector queries).
    fn post(&self, url: &str, body: &str) -> FuseResult<HttpResponse>;
}

/// Per-provider pacing floor: callers invoke [`Pacer::wait`] before each
/// request and the pacer sleeps out whatever remains of the interval since
/// the previous one. One pacer per provider, owned by the sampler that
/// talks to it.
pub struct Pacer {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last: Mutex::new(None) }
    }

    pub fn wait(&self) {
        let mut last = self.last.lock().unwrap();
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    /// Reset the floor (used when switching providers).
    pub fn reset(&self) {
        *self.last.lock().unwrap() = None;
    }
}

/// In-memory fetcher for tests and offline hosts: prefix-routed canned
/// responses plus a request log. Unmatched requests return 404.
#[derive(Default)]
pub struct MemFetch {
    routes: Vec<(String, u16, Vec<u8>)>,
    requests: Mutex<Vec<String>>,
}

impl MemFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route any URL starting with `prefix` to a canned response. First
    /// matching route wins.
    pub fn route(mut self, prefix: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.routes.push((prefix.into(), status, body.into()));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, url: &str) -> FuseResult<HttpResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        for (prefix, status, body) in &self.routes {
            if url.starts_with(prefix.as_str()) {
                return Ok(HttpResponse { status: *status, body: body.clone() });
            }
        }
        Ok(HttpResponse { status: 404, body: Vec::new() })
    }
}

impl HttpFetch for MemFetch {
    fn get(&self, url: &str) -> FuseResult<HttpResponse> {
        self.respond(url)
    }

    fn get_with_accept(&self, url: &str, _accept: &str) -> FuseResult<HttpResponse> {
        self.respond(url)
    }

    fn post(&self, url: &str, body: &str) -> FuseResult<HttpResponse> {
        // Record the body too so tests can assert on query composition.
        self.requests.lock().unwrap().push(format!("{url}\n{body}"));
        for (prefix, status, canned) in &self.routes {
            if url.starts_with(prefix.as_str()) || body.contains(prefix.as_str()) {
                return Ok(HttpResponse { status: *status, body: canned.clone() });
            }
        }
        Ok(HttpResponse { status: 404, body: Vec::new() })
    }
}

/// reqwest-backed implementation of the HTTP capability.
#[cfg(feature = "download")]
pub struct ReqwestFetch {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "download")]
impl ReqwestFetch {
    pub fn new() -> FuseResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(180))
            .user_agent(concat!("hexatlas/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FuseError::transport(format!("build http client: {e}")))?;
        Ok(Self { client })
    }

    fn convert(resp: reqwest::blocking::Response) -> FuseResult<HttpResponse> {
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .map_err(|e| FuseError::transport(format!("read body: {e}")))?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

#[cfg(feature = "download")]
impl HttpFetch for ReqwestFetch {
    fn get(&self, url: &str) -> FuseResult<HttpResponse> {
        let resp = self.client.get(url).send()
            .map_err(|e| FuseError::transport(format!("GET {url}: {e}")))?;
        Self::convert(resp)
    }

    fn get_with_accept(&self, url: &str, accept: &str) -> FuseResult<HttpResponse> {
        let resp = self.client.get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .map_err(|e| FuseError::transport(format!("GET {url}: {e}")))?;
        Self::convert(resp)
    }

    fn post(&self, url: &str, body: &str) -> FuseResult<HttpResponse> {
        let resp = self.client.post(url)
            .body(body.to_string())
            .send()
            .map_err(|e| FuseError::transport(format!("POST {url}: {e}")))?;
        Self::convert(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_enforces_floor() {
        let pacer = Pacer::new(Duration::from_millis(30));
        let start = Instant::now();
        pacer.wait(); // first call is free
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn mem_fetch_routes_by_prefix() {
        let http = MemFetch::new()
            .route("https://tiles/", 200, b"tile".to_vec())
            .route("https://tiles/missing", 404, Vec::new());
        let resp = http.get("https://tiles/N45E006").unwrap();
        assert!(resp.is_ok());
        assert_eq!(resp.body, b"tile");
        assert!(http.get("https://elsewhere/x").unwrap().is_not_found());
        assert_eq!(http.requests().len(), 2);
    }
}
