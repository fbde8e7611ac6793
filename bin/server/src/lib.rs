//! keygate web server.
//!
//! This crate wires the token lifecycle from `keygate-session` into an
//! axum application: OIDC sign-in, encrypted session cookies, and a
//! session endpoint that refreshes expired access tokens on read.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
