//! HTTP layer for the multi-tenant static server.
//!
//! This module provides the axum-based HTTP server that gates requests
//! behind the session layer, resolves the Host header and URL path to a file
//! in the tenant's local mirror, and streams it with a resolved content
//! type. The operator host gets a dynamically rendered landing page instead.

pub mod content_type;
pub mod handler;
pub mod resolve;
