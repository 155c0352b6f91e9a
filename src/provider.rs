//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering the token and
//! upload endpoints plus the client authentication preference. `strategy` defines
//! [`ProviderStrategy`], an HTTP-client-agnostic hook used by flows to map provider
//! responses into the delegate error taxonomy.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
