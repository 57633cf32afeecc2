//! Deterministic cache key derivation.

use sha2::{Digest, Sha256};

use quizmaster_core::Actor;

/// Derive a stable cache key from request identity and parameters.
///
/// The key is a hex SHA-256 over `actor:path:sorted-params:body`, so it is
/// order-independent in the query string and never collides across actors.
/// Collision resistance is all that is required here; this is not a security
/// boundary.
pub fn generate_key(actor: &Actor, path: &str, query_pairs: &[(String, String)], body: &[u8]) -> String {
    let mut pairs: Vec<&(String, String)> = query_pairs.iter().collect();
    pairs.sort();

    let mut hasher = Sha256::new();
    hasher.update(actor.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    hasher.update(b":");
    for (name, value) in pairs {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"&");
    }
    hasher.update(b":");
    hasher.update(body);

    hex::encode(hasher.finalize())
}

/// Parse a raw query string into pairs, sorted by name then value.
pub fn sorted_query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();
    pairs.sort();
    pairs
}
