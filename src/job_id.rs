//! SHA-256 job identifier generation, grounded in `utils.py`'s `generate_hash`: mix the client
//! address, wall clock, and random bits into a 64-hex-char digest. Only collision resistance
//! matters here, not cryptographic unpredictability.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn generate(client_addr: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();

    let mut rng = rand::thread_rng();
    let nonce: u64 = rng.gen();
    let salt: u64 = rng.gen();

    let mut hasher = Sha256::new();
    hasher.update(client_addr.as_bytes());
    hasher.update(now.to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    hasher.update(salt.to_le_bytes());

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use job_id::*;

    #[test]
    fn test_generate_is_64_hex_chars() {
        let id = generate("127.0.0.1");
        assert_eq!(64, id.len());
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_is_collision_resistant() {
        let a = generate("127.0.0.1");
        let b = generate("127.0.0.1");
        assert_ne!(a, b);
    }
}
