//! Fragment request router: the dereference side of a marker.
//!
//! A fragment request is authenticated by its integrity tag and nothing
//! else: no session, no user check. Every failure on this path degrades to
//! an empty body: a forged or garbled marker must render as nothing rather
//! than break the page section being reassembled, so failures surface only
//! as debug diagnostics with distinguishable reasons.

use serde_json::Map;
use tracing::debug;

use crate::control::{CacheControl, ResponseControl, TagSink, VaryProbe};
use crate::marker::{MarkerFields, PARAM_SILENCE};
use crate::producer::{FragmentRequest, ProducerRegistry};
use crate::tag::IntegritySigner;

/// Invalidation tag shared by every fragment response.
pub const TAG_FRAGMENT: &str = "esi";

/// Decodes, authenticates and dispatches inbound fragment requests.
pub struct FragmentRouter {
    signer: IntegritySigner,
    producers: ProducerRegistry,
}

impl FragmentRouter {
    pub fn new(signer: IntegritySigner, producers: ProducerRegistry) -> Self {
        Self { signer, producers }
    }

    /// Serve one fragment request from its raw query string.
    ///
    /// Returns the fragment body; the empty string on any verification,
    /// decode or dispatch failure.
    pub async fn dispatch(
        &self,
        query: &str,
        control: &dyn ResponseControl,
        tags: &dyn TagSink,
        vary: &dyn VaryProbe,
    ) -> String {
        let (fields, supplied_tag) = match MarkerFields::parse(query) {
            Ok(parsed) => parsed,
            Err(error) => {
                debug!(reason = "malformed-query", %error, "rejecting fragment request");
                return String::new();
            }
        };

        // Sole authentication gate: recompute the tag over the raw fields.
        if !self.signer.verify(
            &fields.action,
            fields.control.as_deref(),
            fields.args.as_deref(),
            &supplied_tag,
        ) {
            debug!(
                reason = "hash-mismatch",
                action = %fields.action,
                "rejecting fragment request"
            );
            return String::new();
        }

        let mut params = match &fields.args {
            Some(args) => match crate::marker::decode_params(args) {
                Ok(params) => params,
                Err(error) => {
                    debug!(
                        reason = "params-decode",
                        action = %fields.action,
                        %error,
                        "rejecting fragment request"
                    );
                    return String::new();
                }
            },
            None => Map::new(),
        };

        let silent = params
            .remove(PARAM_SILENCE)
            .is_some_and(|value| value.as_bool().unwrap_or(true));

        tags.add_tag(TAG_FRAGMENT);
        tags.add_tag(&format!("{TAG_FRAGMENT}.{}", fields.action));

        // Narrow the ambient policy before the producer runs so the default
        // can still be tightened even though the producer has the last word.
        if let Some(raw) = &fields.control {
            CacheControl::parse(raw).apply(control);
        }

        let Some(producer) = self.producers.get(&fields.action) else {
            debug!(
                reason = "unregistered",
                action = %fields.action,
                "no producer for fragment action"
            );
            return String::new();
        };

        debug!(action = %fields.action, silent, "dispatching fragment request");

        producer
            .produce(FragmentRequest {
                action: &fields.action,
                params: &params,
                silent,
                control,
                tags,
                vary,
            })
            .await
    }
}
