//! Credential verification over bcrypt hashes.

const DUMMY_SECRET: &str = "authgate-timing-equaliser";

/// Hash a new secret. Called once, at the point the secret is persisted.
pub fn hash_password(secret: &str, cost: u32) -> anyhow::Result<String> {
    Ok(bcrypt::hash(secret, cost)?)
}

/// Check `candidate` against a stored bcrypt hash. A malformed hash never verifies.
pub fn verify_password(stored_hash: &str, candidate: &str) -> bool {
    bcrypt::verify(candidate, stored_hash).unwrap_or(false)
}

/// Hash verified against when the username is unknown. Must be built at the
/// same cost as stored hashes or the response time reveals whether the
/// account exists.
pub fn dummy_hash(cost: u32) -> anyhow::Result<String> {
    hash_password(DUMMY_SECRET, cost)
}

/// Burn the same work as a real verification and always fail.
pub fn verify_against_dummy(dummy_hash: &str, candidate: &str) {
    let _ = verify_password(dummy_hash, candidate);
}

/// Work factor encoded in a bcrypt hash (`$2b$<cost>$...`).
pub fn hash_cost(hash: &str) -> Option<u32> {
    hash.split('$').nth(2)?.parse().ok()
}
