//! Cache-control directives carried by fragment markers.
//!
//! A marker ships a comma-separated directive list (`private,no-vary`,
//! `ttl=600`, ...) that narrows the ambient response policy before the
//! producer runs. The collaborator traits at the bottom are the seams to
//! the surrounding cache engine: the subsystem only calls them, it never
//! owns the response policy itself.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use tracing::debug;

/// One recognized cache-control token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Cache per-user rather than in the shared public cache.
    Private,
    /// Cache in the shared public cache.
    Public,
    /// Do not vary the cache entry on the request's vary dimensions.
    NoVary,
    /// Override the TTL for this fragment, in seconds.
    Ttl(u64),
}

impl Directive {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::NoVary => "no-vary",
            Self::Ttl(_) => "ttl",
        }
    }
}

impl Display for Directive {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ttl(secs) => write!(f, "ttl={secs}"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for Directive {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "no-vary" => Ok(Self::NoVary),
            _ => match s.strip_prefix("ttl=") {
                Some(secs) => secs.parse().map(Self::Ttl).map_err(|_| ()),
                None => Err(()),
            },
        }
    }
}

/// Ordered, de-duplicated directive list for one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheControl {
    directives: Vec<Directive>,
}

impl CacheControl {
    /// An empty directive list: public, vary-by-default.
    pub fn none() -> Self {
        Self::default()
    }

    /// The default policy for fragment markers.
    pub fn private_no_vary() -> Self {
        Self {
            directives: vec![Directive::Private, Directive::NoVary],
        }
    }

    /// Parse a comma-separated directive list.
    ///
    /// Unrecognized tokens are skipped with a debug log; a directive list
    /// from a tampered marker must not be able to fail the whole request.
    pub fn parse(raw: &str) -> Self {
        let mut control = Self::default();
        for token in raw.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.parse() {
                Ok(directive) => control.push(directive),
                Err(()) => debug!(token, "skipping unrecognized cache-control token"),
            }
        }
        control
    }

    /// Append a directive, ignoring exact duplicates.
    pub fn push(&mut self, directive: Directive) {
        if !self.directives.contains(&directive) {
            self.directives.push(directive);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn has_private(&self) -> bool {
        self.directives.contains(&Directive::Private)
    }

    pub fn has_no_vary(&self) -> bool {
        self.directives.contains(&Directive::NoVary)
    }

    /// The TTL override, if one was set.
    pub fn ttl(&self) -> Option<u64> {
        self.directives.iter().find_map(|d| match d {
            Directive::Ttl(secs) => Some(*secs),
            _ => None,
        })
    }

    /// Narrow the ambient response policy with this fragment's directives.
    ///
    /// Only `private` and `no-vary` propagate here; a TTL override belongs
    /// to the producer, which may still decide the fragment is uncacheable.
    pub fn apply(&self, sink: &dyn ResponseControl) {
        if self.has_private() {
            sink.set_private();
        }
        if self.has_no_vary() {
            sink.set_no_vary();
        }
    }
}

impl Display for CacheControl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, directive) in self.directives.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{directive}")?;
        }
        Ok(())
    }
}

/// Response cache-policy sink owned by the surrounding cache engine.
pub trait ResponseControl: Send + Sync {
    /// Move the response into the per-user cache.
    fn set_private(&self);
    /// Stop varying the cache entry on the request's vary dimensions.
    fn set_no_vary(&self);
    /// Override the response TTL in seconds.
    fn set_custom_ttl(&self, secs: u64);
    /// Mark the response uncacheable; `reason` is diagnostic only.
    fn set_no_cache(&self, reason: &str);
}

/// Invalidation-tag sink owned by the surrounding cache engine.
pub trait TagSink: Send + Sync {
    fn add_tag(&self, tag: &str);
}

/// Whether the current request varies per user (login/session cookie).
pub trait VaryProbe: Send + Sync {
    fn has_vary(&self) -> bool;
}
