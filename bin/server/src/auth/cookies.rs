//! Encrypted, chunked storage of the token record in cookies.
//!
//! The record is serialized to JSON, base64url-encoded, and split into
//! chunks of at most [`CHUNK_SIZE`] characters. The first chunk is stored
//! under [`SESSION_COOKIE`], later ones under `keygate.session.1`,
//! `keygate.session.2`, and so on. Each chunk is encrypted by the
//! [`PrivateCookieJar`], so the record is never readable client-side.

use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use base64::Engine;
use keygate_session::TokenRecord;
use std::collections::BTreeMap;
use std::fmt;
use time::Duration as TimeDuration;
use tracing::debug;

use crate::config::SessionConfig;

/// Base name of the session cookie chunks.
pub const SESSION_COOKIE: &str = "keygate.session";

/// Auth state cookie name (for CSRF protection during OIDC flow).
pub const AUTH_STATE_COOKIE: &str = "keygate.auth_state";

/// Maximum characters of encoded record per cookie.
pub const CHUNK_SIZE: usize = 2800;

/// Upper bound on chunks read or written for a single session.
pub const MAX_CHUNKS: usize = 16;

/// Errors raised while moving a record in or out of cookies.
#[derive(Debug)]
pub enum SessionCookieError {
    /// The record could not be serialized.
    Encode { reason: String },
    /// The cookie contents are not a valid record.
    Decode { reason: String },
    /// The encoded record needs more than [`MAX_CHUNKS`] cookies.
    TooLarge { chunks: usize },
}

impl fmt::Display for SessionCookieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode { reason } => write!(f, "failed to encode session: {}", reason),
            Self::Decode { reason } => write!(f, "failed to decode session: {}", reason),
            Self::TooLarge { chunks } => write!(
                f,
                "session needs {} cookies, limit is {}",
                chunks, MAX_CHUNKS
            ),
        }
    }
}

impl std::error::Error for SessionCookieError {}

/// Serializes a record into its cookie representation.
pub fn encode_record(record: &TokenRecord) -> Result<String, SessionCookieError> {
    let json = serde_json::to_vec(record).map_err(|e| SessionCookieError::Encode {
        reason: e.to_string(),
    })?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
}

/// Parses a record from its cookie representation.
pub fn decode_record(encoded: &str) -> Result<TokenRecord, SessionCookieError> {
    let json = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| SessionCookieError::Decode {
            reason: e.to_string(),
        })?;
    serde_json::from_slice(&json).map_err(|e| SessionCookieError::Decode {
        reason: e.to_string(),
    })
}

/// Returns the cookie name for chunk `index`.
pub fn chunk_name(index: usize) -> String {
    if index == 0 {
        SESSION_COOKIE.to_string()
    } else {
        format!("{SESSION_COOKIE}.{index}")
    }
}

/// Splits an encoded record into cookie-sized pieces.
///
/// The encoding is base64url, so splitting on byte offsets never cuts a
/// character.
pub fn split_chunks(encoded: &str) -> Vec<&str> {
    if encoded.is_empty() {
        return vec![encoded];
    }
    encoded
        .as_bytes()
        .chunks(CHUNK_SIZE)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect()
}

/// Reassembles chunks keyed by index.
///
/// Returns `None` when there are no chunks or the indices are not
/// contiguous from zero.
pub fn join_chunks(chunks: BTreeMap<usize, String>) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    let mut joined = String::new();
    for (expected, (index, value)) in chunks.into_iter().enumerate() {
        if index != expected {
            return None;
        }
        joined.push_str(&value);
    }
    Some(joined)
}

/// Reads the token record stored in the jar, if any.
///
/// Missing, partial, or undecodable sessions all read as no session.
pub fn read_session(jar: &PrivateCookieJar) -> Option<TokenRecord> {
    let chunks: BTreeMap<usize, String> = (0..MAX_CHUNKS)
        .filter_map(|index| {
            jar.get(&chunk_name(index))
                .map(|cookie| (index, cookie.value().to_string()))
        })
        .collect();

    let encoded = join_chunks(chunks)?;
    match decode_record(&encoded) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(error = %e, "ignoring unreadable session cookie");
            None
        }
    }
}

/// Stores the record in the jar, replacing any previous session.
pub fn write_session(
    jar: PrivateCookieJar,
    record: &TokenRecord,
    config: &SessionConfig,
) -> Result<PrivateCookieJar, SessionCookieError> {
    let encoded = encode_record(record)?;
    let chunks = split_chunks(&encoded);
    if chunks.len() > MAX_CHUNKS {
        return Err(SessionCookieError::TooLarge {
            chunks: chunks.len(),
        });
    }

    let mut jar = jar;
    for (index, chunk) in chunks.iter().enumerate() {
        let cookie = Cookie::build((chunk_name(index), (*chunk).to_string()))
            .path("/")
            .http_only(true)
            .secure(config.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(TimeDuration::days(config.max_age_days));
        jar = jar.add(cookie);
    }

    Ok(remove_chunks_from(jar, chunks.len()))
}

/// Removes every session chunk from the jar.
pub fn clear_session(jar: PrivateCookieJar) -> PrivateCookieJar {
    remove_chunks_from(jar, 0)
}

fn remove_chunks_from(mut jar: PrivateCookieJar, first: usize) -> PrivateCookieJar {
    for index in first..MAX_CHUNKS {
        let name = chunk_name(index);
        if jar.get(&name).is_some() {
            jar = jar.remove(Cookie::build((name, "")).path("/"));
        }
    }
    jar
}
