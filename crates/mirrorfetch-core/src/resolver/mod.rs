//! Resolver interface for turning mirror links into directly fetchable URLs.
//!
//! The job only depends on the `Resolver` trait. A failed resolution is never retried
//! here: the job moves straight on to the next host for the same part.

mod unrestrict;

use thiserror::Error;

pub use unrestrict::{parse_unrestrict_body, UnrestrictClient};

/// Why a mirror link could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no unrestrict token configured")]
    MissingToken,
    #[error("unrestrict request failed: {0}")]
    Transport(#[from] curl::Error),
    #[error("unrestrict returned HTTP {0}")]
    Status(u32),
    #[error("malformed unrestrict response: {0}")]
    Malformed(String),
}

/// Turns one mirror URL into a direct download URL.
pub trait Resolver: Send + Sync {
    fn resolve(&self, mirror_url: &str) -> Result<String, ResolveError>;
}

/// Resolver for links that are already direct; returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectResolver;

impl Resolver for DirectResolver {
    fn resolve(&self, mirror_url: &str) -> Result<String, ResolveError> {
        Ok(mirror_url.to_string())
    }
}
