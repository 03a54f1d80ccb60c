//! Fragment descriptors: one cacheable unit of a page.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::control::CacheControl;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// Block ids travel inside the marker URL; anything outside
    /// `[A-Za-z0-9_-]` is rejected before a marker is built.
    #[error("invalid block id `{id}`: only alphanumerics, `-` and `_` are allowed")]
    InvalidBlockId { id: String },
}

/// Identifies one independently cacheable sub-region of a page.
///
/// The descriptor is the encoder's input: the block id selects the producer
/// category, the params are the producer's payload, and the cache-control
/// directives are the fragment's own policy, independent of the page that
/// embeds it.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDescriptor {
    block_id: String,
    wrapper_label: String,
    params: Map<String, Value>,
    cache_control: CacheControl,
    silent: bool,
    preserved: bool,
    store_var: bool,
}

impl FragmentDescriptor {
    /// Create a descriptor with the default `private,no-vary` policy.
    ///
    /// The wrapper label is only used for the debug wrapping comments around
    /// the marker; it is not authenticated and never reaches the wire query.
    pub fn new(
        block_id: impl Into<String>,
        wrapper_label: impl Into<String>,
    ) -> Result<Self, DescriptorError> {
        let block_id = block_id.into();
        if !is_valid_block_id(&block_id) {
            return Err(DescriptorError::InvalidBlockId { id: block_id });
        }
        Ok(Self {
            block_id,
            wrapper_label: wrapper_label.into(),
            params: Map::new(),
            cache_control: CacheControl::private_no_vary(),
            silent: false,
            preserved: false,
            store_var: false,
        })
    }

    /// Add one producer parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replace the whole parameter payload.
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Replace the cache-control directives. `CacheControl::none()` means
    /// public and vary-by-default.
    pub fn with_cache_control(mut self, control: CacheControl) -> Self {
        self.cache_control = control;
        self
    }

    /// Suppress the wrapper comments; used when the marker lands inside a
    /// tag attribute where a comment would break the document.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Park the marker in the preserve registry and emit its hash instead,
    /// so the marker survives hostile content filters until finalize.
    pub fn preserved(mut self) -> Self {
        self.preserved = true;
        self
    }

    /// Ask the edge to hold the fragment result in a request variable.
    pub fn store_var(mut self) -> Self {
        self.store_var = true;
        self
    }

    pub fn block_id(&self) -> &str {
        &self.block_id
    }

    pub fn wrapper_label(&self) -> &str {
        &self.wrapper_label
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn cache_control(&self) -> &CacheControl {
        &self.cache_control
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn is_preserved(&self) -> bool {
        self.preserved
    }

    pub fn is_store_var(&self) -> bool {
        self.store_var
    }
}

fn is_valid_block_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
