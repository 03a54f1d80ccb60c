//! Tessera: Edge Side Include fragment caching.
//!
//! Splits one page render into independently cacheable fragments and puts
//! them back together safely:
//!
//! - **Encode**: a page region becomes a signed marker
//!   (`<esi:include src='…'/>`) embedded in the buffer, optionally disguised
//!   as an opaque hash when a hostile filter would strip the tag.
//! - **Finalize**: the last buffer pass restores disguised markers.
//! - **Dereference**: the edge requests each marker; the router verifies the
//!   integrity tag, decodes the params, narrows the response cache policy
//!   and dispatches to the registered producer.
//!
//! The cache storage itself is external: producers and the router talk to it
//! only through the [`ResponseControl`], [`TagSink`] and [`VaryProbe`]
//! collaborator traits. Nothing here is ever fatal to page delivery; every
//! failure degrades to "this fragment renders as nothing".

pub mod config;
pub mod context;
pub mod control;
pub mod descriptor;
pub mod encode;
pub mod http;
pub mod marker;
pub mod nonce;
pub mod preserve;
pub mod producer;
pub mod router;
pub mod tag;

pub use config::{ConfigError, EsiConfig};
pub use context::EsiContext;
pub use control::{CacheControl, Directive, ResponseControl, TagSink, VaryProbe};
pub use descriptor::{DescriptorError, FragmentDescriptor};
pub use encode::{EncodeError, FragmentEncoder, MarkerOutput};
pub use http::{ControlState, EsiState};
pub use marker::{MarkerError, MarkerFields, is_fragment_request};
pub use nonce::{NonceActionList, NonceFetchError, fetch_remote_actions};
pub use preserve::PreserveRegistry;
pub use producer::{FragmentProducer, FragmentRequest, NonceMinter, NonceProducer, ProducerRegistry};
pub use router::FragmentRouter;
pub use tag::IntegritySigner;
