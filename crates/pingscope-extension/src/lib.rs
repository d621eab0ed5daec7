//! # pingscope-extension
//!
//! Observes keep-alive traffic: every inbound PINGREQ is logged and followed
//! by an asynchronous lookup of the sending client's session.
//!
//! ## Flow
//!
//! broker thread -> [`PingReqInterceptor`] (logs, spawns the lookup, returns)
//! -> session lookup on the injected runtime -> [`report_lookup_outcome`]
//! (logs the session, its absence, or the lookup error).
//!
//! Nothing here alters, delays or rejects the packet, and no failure in the
//! lookup is visible to the broker.

pub mod continuation;
pub mod extension;
pub mod interceptor;

pub use continuation::{lookup_and_report, report_lookup_outcome, LookupReport};
pub use extension::{extension_information, PingReqInitializer, PingScopeExtension};
pub use interceptor::{PingReqInterceptor, INTERCEPTOR_NAME};
