//! Connection identity and authentication for mapsync.
//!
//! This crate answers three questions about a freshly upgraded channel:
//!
//! 1. **What is it?** [`Identity`] classifies the upgrade-time identity as
//!    a world or chat channel.
//! 2. **Is it allowed?** [`Authenticator`] checks the first frame's
//!    credentials ([`ClientCredentials`] by default).
//! 3. **Where can others find it?** [`ConnectionRegistry`] maps identity
//!    keys to live connections.
//!
//! # How it fits in the stack
//!
//! ```text
//! mapsync (Connection, Router)   ← owns one registry per ChannelKind
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer                 ← provides Credentials
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod identity;
mod registry;

pub use auth::{Authenticator, ClientCredentials};
pub use error::SessionError;
pub use identity::{ChannelKind, Identity};
pub use registry::ConnectionRegistry;
