//! Per-request ESI state.
//!
//! One context lives for exactly one page render: it collects preserved
//! markers and remembers whether the page produced any fragment at all.
//! The context is threaded through encode and finalize explicitly; a
//! pooled worker serving many requests must never share this state, and
//! the fragment request that later dereferences a marker gets a fresh
//! context of its own; the signed marker is the only channel between them.

use crate::preserve::PreserveRegistry;

/// Request-scoped fragment state for one page render.
#[derive(Debug, Default)]
pub struct EsiContext {
    has_fragments: bool,
    preserve: PreserveRegistry,
}

impl EsiContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any fragment marker was emitted during this render.
    ///
    /// The host uses this to decide whether the response needs the edge's
    /// ESI processing at all, and whether finalize is worth running.
    pub fn has_fragments(&self) -> bool {
        self.has_fragments
    }

    /// Record that the page now carries at least one fragment marker.
    pub fn mark_has_fragments(&mut self) {
        self.has_fragments = true;
    }

    pub fn preserve(&self) -> &PreserveRegistry {
        &self.preserve
    }

    pub fn preserve_mut(&mut self) -> &mut PreserveRegistry {
        &mut self.preserve
    }

    /// Restore preserved markers in the final output buffer.
    pub fn finalize(&self, buffer: String) -> String {
        self.preserve.finalize(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_has_no_fragments() {
        let ctx = EsiContext::new();
        assert!(!ctx.has_fragments());
        assert!(ctx.preserve().is_empty());
    }

    #[test]
    fn finalize_delegates_to_the_registry() {
        let mut ctx = EsiContext::new();
        let hash = ctx.preserve_mut().register("<esi:include src='/?lsesi=a&_hash=x' />");
        ctx.mark_has_fragments();

        let restored = ctx.finalize(format!("page {hash} page"));
        assert!(restored.contains("<esi:include"));
    }
}
