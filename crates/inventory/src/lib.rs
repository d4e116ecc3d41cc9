//! HTTP implementation of the inventory collaborator.
//!
//! Talks to the inventory REST API with api key/secret headers, pages query
//! results, and maps every transport, status, or decode failure to
//! [`axonbot_core::InventoryError::Remote`].

pub mod client;
pub mod filter;

pub use client::{HttpInventoryClient, MAX_PAGES};
