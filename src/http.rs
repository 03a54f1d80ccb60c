//! Axum endpoint for fragment requests.
//!
//! The edge dereferences a marker by requesting the page origin with the
//! marker's query string. This module mounts that endpoint: it builds a
//! per-request [`ControlState`] collaborator, lets the router dispatch, and
//! publishes whatever policy the fragment set as response headers for the
//! cache layer in front. The response is always `200` with the fragment
//! body, empty for rejected requests, never an error page.

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, header::COOKIE},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tracing::{debug, instrument};

use crate::control::{ResponseControl, TagSink, VaryProbe};
use crate::router::FragmentRouter;

/// Response header carrying the fragment's cache-control result.
pub const HEADER_CACHE_CONTROL: &str = "x-fragment-cache-control";
/// Response header carrying the fragment's invalidation tags.
pub const HEADER_TAG: &str = "x-fragment-tag";

/// Shared state for the fragment endpoint.
#[derive(Clone)]
pub struct EsiState {
    router: Arc<FragmentRouter>,
    vary_cookie: String,
}

impl EsiState {
    pub fn new(router: Arc<FragmentRouter>) -> Self {
        Self {
            router,
            vary_cookie: "session".to_string(),
        }
    }

    /// Name of the cookie whose presence marks a per-user request.
    pub fn with_vary_cookie(mut self, name: impl Into<String>) -> Self {
        self.vary_cookie = name.into();
        self
    }
}

/// Per-request collaborator collecting the fragment's cache policy.
///
/// Accumulates directive and tag calls behind a mutex and renders them into
/// the response headers once the producer is done. `no-cache` beats every
/// other directive.
pub struct ControlState {
    vary: bool,
    inner: Mutex<ControlInner>,
}

#[derive(Default)]
struct ControlInner {
    private: bool,
    no_vary: bool,
    ttl: Option<u64>,
    no_cache_reason: Option<String>,
    tags: Vec<String>,
}

impl ControlState {
    pub fn with_vary(vary: bool) -> Self {
        Self {
            vary,
            inner: Mutex::new(ControlInner::default()),
        }
    }

    /// The `x-fragment-cache-control` value, if any policy was set.
    pub fn cache_control_header(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        if inner.no_cache_reason.is_some() {
            return Some("no-cache".to_string());
        }

        let mut parts = Vec::new();
        if inner.private {
            parts.push("private".to_string());
        }
        if inner.no_vary {
            parts.push("no-vary".to_string());
        }
        if let Some(secs) = inner.ttl {
            parts.push(format!("max-age={secs}"));
        }
        (!parts.is_empty()).then(|| parts.join(","))
    }

    /// The `x-fragment-tag` value, if any tag was emitted.
    pub fn tag_header(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        (!inner.tags.is_empty()).then(|| inner.tags.join(","))
    }
}

impl ResponseControl for ControlState {
    fn set_private(&self) {
        self.inner.lock().unwrap().private = true;
    }

    fn set_no_vary(&self) {
        self.inner.lock().unwrap().no_vary = true;
    }

    fn set_custom_ttl(&self, secs: u64) {
        self.inner.lock().unwrap().ttl = Some(secs);
    }

    fn set_no_cache(&self, reason: &str) {
        debug!(reason, "fragment forced uncacheable");
        self.inner.lock().unwrap().no_cache_reason = Some(reason.to_string());
    }
}

impl TagSink for ControlState {
    fn add_tag(&self, tag: &str) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.tags.iter().any(|t| t == tag) {
            inner.tags.push(tag.to_string());
        }
    }
}

impl VaryProbe for ControlState {
    fn has_vary(&self) -> bool {
        self.vary
    }
}

/// Mount the fragment endpoint at the root of a router.
///
/// The host nests or merges this under the path its markers use as
/// `base_path`, and routes page requests here whenever
/// [`crate::marker::is_fragment_request`] matches their query string.
pub fn routes(state: EsiState) -> Router {
    Router::new()
        .route("/", get(serve_fragment))
        .with_state(state)
}

#[instrument(skip_all, fields(vary))]
async fn serve_fragment(
    State(state): State<EsiState>,
    request: Request<Body>,
) -> Response {
    let vary = request
        .headers()
        .get(COOKIE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|cookies| cookies.contains(&format!("{}=", state.vary_cookie)));
    tracing::Span::current().record("vary", vary);

    let query = request.uri().query().unwrap_or_default().to_string();

    let sinks = ControlState::with_vary(vary);
    let body = state.router.dispatch(&query, &sinks, &sinks, &sinks).await;

    let mut response = Html(body).into_response();
    append_header(&mut response, HEADER_CACHE_CONTROL, sinks.cache_control_header());
    append_header(&mut response, HEADER_TAG, sinks.tag_header());
    response
}

fn append_header(response: &mut Response, name: &'static str, value: Option<String>) {
    if let Some(value) = value {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(name), value);
        }
    }
}
