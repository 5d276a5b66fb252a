//! API endpoint handlers for the catalog backend.

pub mod auth;
pub mod tracks;
