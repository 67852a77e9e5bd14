//! Authentication and session lifecycle service for a frontend with
//! accounts: password hashing, credential validation, cookie sessions, and
//! single-use email tokens behind a small JSON API.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;
