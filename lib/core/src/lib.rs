//! Core primitives shared by the keygate crates.
//!
//! This crate provides the error-handling foundation and the epoch-seconds
//! time model used by the token lifecycle.

pub mod error;
pub mod time;

pub use error::Result;
pub use time::{Clock, EpochSeconds, ManualClock, SystemClock};
