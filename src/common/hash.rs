//! Hashing utilities for minicoord
//!
//! BLAKE3 gives stable, content-derived identifiers for registrations.

/// Short content-derived id: the first `len` hex chars of BLAKE3(parts joined by NUL)
pub fn short_id(parts: &[&str], len: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(&[0]);
        }
        hasher.update(part.as_bytes());
    }
    let hex = hasher.finalize().to_hex();
    let hex = hex.as_str();
    hex[..len.min(hex.len())].to_string()
}
