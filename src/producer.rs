//! Fragment producers and their dispatch table.
//!
//! A producer renders one fragment category. Dispatch is an open table keyed
//! by action name: the host registers its producers at startup, the router
//! looks them up per request. Producers tighten their own cache policy
//! through the collaborator handles on the request; the router never
//! decides TTLs on their behalf.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::control::{ResponseControl, TagSink, VaryProbe};

/// Everything a producer gets to see for one fragment request.
pub struct FragmentRequest<'a> {
    /// The dispatched action name.
    pub action: &'a str,
    /// Decoded producer params from the marker.
    pub params: &'a Map<String, Value>,
    /// Whether the marker was emitted silent.
    pub silent: bool,
    /// Ambient response cache-policy sink.
    pub control: &'a dyn ResponseControl,
    /// Invalidation-tag sink.
    pub tags: &'a dyn TagSink,
    /// Whether this request varies per user.
    pub vary: &'a dyn VaryProbe,
}

/// Renders one fragment category.
#[async_trait]
pub trait FragmentProducer: Send + Sync {
    /// Produce the fragment body. Must not fail the request: a producer
    /// that cannot render returns an empty string and narrows the cache
    /// policy as needed.
    async fn produce(&self, request: FragmentRequest<'_>) -> String;
}

/// Action name → producer table, populated at startup.
#[derive(Default)]
pub struct ProducerRegistry {
    handlers: HashMap<String, Arc<dyn FragmentProducer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer for an action name, replacing any previous one.
    pub fn register(&mut self, action: impl Into<String>, producer: Arc<dyn FragmentProducer>) {
        let action = action.into();
        debug!(action, "registered fragment producer");
        self.handlers.insert(action, producer);
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn FragmentProducer>> {
        self.handlers.get(action).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

/// Mints an authentication nonce for an action; owned by the host.
pub trait NonceMinter: Send + Sync {
    fn mint(&self, action: &str) -> String;
}

/// Built-in producer serving virtualized nonces.
///
/// The fragment body is the bare nonce value, cached for a fixed window and
/// per-user whenever the request varies. A zero TTL turns the fragment
/// uncacheable instead.
pub struct NonceProducer {
    minter: Arc<dyn NonceMinter>,
    ttl_secs: u64,
}

impl NonceProducer {
    pub fn new(minter: Arc<dyn NonceMinter>, ttl_secs: u64) -> Self {
        Self { minter, ttl_secs }
    }
}

#[async_trait]
impl FragmentProducer for NonceProducer {
    async fn produce(&self, request: FragmentRequest<'_>) -> String {
        if self.ttl_secs == 0 {
            request.control.set_no_cache("nonce ttl set to 0");
        } else {
            request.control.set_custom_ttl(self.ttl_secs);
        }

        if request.vary.has_vary() {
            request.control.set_private();
        }

        let action = request
            .params
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default();
        debug!(action, "minting nonce fragment");
        self.minter.mint(action)
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::RecordingCollaborators;
    use super::*;

    struct StubMinter;

    impl NonceMinter for StubMinter {
        fn mint(&self, action: &str) -> String {
            format!("nonce-for-{action}")
        }
    }

    fn request<'a>(
        params: &'a Map<String, Value>,
        sinks: &'a RecordingCollaborators,
    ) -> FragmentRequest<'a> {
        FragmentRequest {
            action: "nonce",
            params,
            silent: false,
            control: sinks,
            tags: sinks,
            vary: sinks,
        }
    }

    #[tokio::test]
    async fn nonce_producer_sets_ttl_and_mints() {
        let producer = NonceProducer::new(Arc::new(StubMinter), 43_200);
        let mut params = Map::new();
        params.insert("action".into(), json!("comment_form_nonce"));
        let sinks = RecordingCollaborators::with_vary(false);

        let body = producer.produce(request(&params, &sinks)).await;
        assert_eq!(body, "nonce-for-comment_form_nonce");
        assert_eq!(sinks.control_calls(), vec!["ttl=43200"]);
    }

    #[tokio::test]
    async fn nonce_producer_goes_private_for_varied_requests() {
        let producer = NonceProducer::new(Arc::new(StubMinter), 43_200);
        let params = Map::new();
        let sinks = RecordingCollaborators::with_vary(true);

        producer.produce(request(&params, &sinks)).await;
        assert_eq!(sinks.control_calls(), vec!["ttl=43200", "private"]);
    }

    #[tokio::test]
    async fn zero_ttl_disables_caching_instead() {
        let producer = NonceProducer::new(Arc::new(StubMinter), 0);
        let params = Map::new();
        let sinks = RecordingCollaborators::with_vary(false);

        producer.produce(request(&params, &sinks)).await;
        assert_eq!(sinks.control_calls(), vec!["no-cache:nonce ttl set to 0"]);
    }

    #[test]
    fn registry_replaces_on_re_register() {
        let mut registry = ProducerRegistry::new();
        registry.register("nonce", Arc::new(NonceProducer::new(Arc::new(StubMinter), 1)));
        registry.register("nonce", Arc::new(NonceProducer::new(Arc::new(StubMinter), 2)));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("nonce").is_some());
        assert!(registry.get("widget").is_none());
    }
}
