//! Shared world state for mapsync.
//!
//! # Key types
//!
//! - [`PlayerRegistry`]: map id → user id → live player, with the
//!   at-most-one-map invariant
//! - [`Membership`] / [`Transition`]: the per-connection map-membership
//!   state machine the router drives

mod membership;
mod registry;

pub use membership::{Membership, Transition};
pub use registry::PlayerRegistry;
