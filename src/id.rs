//! Connection identifier generation
//!
//! The hub consumes identifiers through an injectable generator so callers
//! can substitute deterministic ids in tests or domain-specific schemes in
//! production. The default produces UUIDv4 strings.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

/// Injectable identifier source.
///
/// Must return values with negligible collision probability over the
/// registry's lifetime, and must not fail: a generator whose primary
/// strategy can error is expected to fall back internally (see
/// [`random_id`]) rather than propagate.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// The default identifier source: UUIDv4 strings.
pub fn default_id_generator() -> IdGenerator {
    Arc::new(|| Uuid::new_v4().to_string())
}

/// Secondary identifier strategy: an alphanumeric string of length `n`.
///
/// Suitable as a fallback for custom generators whose primary strategy can
/// fail; 64 characters give comfortably more entropy than a UUID.
pub fn random_id(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}
