//! Orchard Core - Shared types library.
//!
//! This crate provides common types used across all Orchard components:
//! - `session` - the client-side session layer (authentication state and
//!   transport)
//! - the storefront views that consume it
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps
//! it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, and roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
