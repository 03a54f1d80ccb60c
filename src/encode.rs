//! Fragment encoder: descriptor → embeddable marker.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::context::EsiContext;
use crate::descriptor::FragmentDescriptor;
use crate::marker::{self, MarkerError, MarkerFields, PARAM_SILENCE};
use crate::tag::IntegritySigner;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to encode fragment params: {0}")]
    Params(#[from] MarkerError),
}

/// What the encoder hands back for embedding into the page buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerOutput {
    /// A ready-to-embed marker (include tag, possibly comment-wrapped).
    Inline(String),
    /// The hash stand-in of a preserved marker; the real marker sits in the
    /// context's preserve registry until finalize.
    Preserved(String),
}

impl MarkerOutput {
    /// The text to splice into the buffer, whichever variant this is.
    pub fn embed(&self) -> &str {
        match self {
            Self::Inline(text) | Self::Preserved(text) => text,
        }
    }

    pub fn is_preserved(&self) -> bool {
        matches!(self, Self::Preserved(_))
    }
}

/// Serializes fragment descriptors into signed, embeddable markers.
#[derive(Debug, Clone)]
pub struct FragmentEncoder {
    signer: IntegritySigner,
    base_path: String,
    wrapper_prefix: String,
}

impl FragmentEncoder {
    pub fn new(
        signer: IntegritySigner,
        base_path: impl Into<String>,
        wrapper_prefix: impl Into<String>,
    ) -> Self {
        Self {
            signer,
            base_path: base_path.into(),
            wrapper_prefix: wrapper_prefix.into(),
        }
    }

    /// Encode one descriptor into a marker, recording side effects on `ctx`.
    ///
    /// On success the context is flagged as fragment-bearing; a preserved
    /// descriptor additionally parks the marker and yields its hash. Errors
    /// only report; the caller skips the fragment and the page render goes
    /// on unharmed.
    pub fn encode(
        &self,
        descriptor: &FragmentDescriptor,
        ctx: &mut EsiContext,
    ) -> Result<MarkerOutput, EncodeError> {
        let mut params = descriptor.params().clone();
        if descriptor.is_silent() {
            // Carried inside the signed payload so the fragment render
            // also knows to skip its own wrapper.
            params.insert(PARAM_SILENCE.to_string(), Value::Bool(true));
        }

        let control = descriptor.cache_control().to_string();
        let fields = MarkerFields {
            action: descriptor.block_id().to_string(),
            control: (!control.is_empty()).then_some(control.clone()),
            args: if params.is_empty() {
                None
            } else {
                Some(marker::encode_params(&params)?)
            },
        };

        let tag = self
            .signer
            .sign(&fields.action, fields.control.as_deref(), fields.args.as_deref());
        let url = format!("{}?{}", self.base_path, fields.to_query(&tag));

        let mut include = format!("<esi:include src='{url}'");
        if !control.is_empty() {
            include.push_str(&format!(" cache-control='{control}'"));
        }
        if descriptor.is_store_var() {
            include.push_str(" as-var='1'");
        }
        include.push_str(" />");

        let output = if descriptor.is_silent() {
            include
        } else {
            let prefix = &self.wrapper_prefix;
            let label = descriptor.wrapper_label();
            format!("<!-- {prefix} {label} -->{include}<!-- {prefix} {label} esi end -->")
        };

        debug!(
            block_id = descriptor.block_id(),
            control = %descriptor.cache_control(),
            preserved = descriptor.is_preserved(),
            "encoded fragment marker"
        );

        ctx.mark_has_fragments();

        if descriptor.is_preserved() {
            let hash = ctx.preserve_mut().register(&output);
            return Ok(MarkerOutput::Preserved(hash));
        }

        Ok(MarkerOutput::Inline(output))
    }
}
