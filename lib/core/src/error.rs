//! Shared result alias for keygate crates.
//!
//! Domain error enums live next to the code that raises them
//! (`keygate_session::RefreshError`, `keygate_session::ConfigError`, ...);
//! this alias wraps them in a rootcause [`Report`] so callers keep the
//! full context chain when they propagate with `?`.

use rootcause::Report;

/// `Result` whose error side is a [`Report`] over the context type `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
