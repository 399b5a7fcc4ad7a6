// Consent token helpers
use sha2::{Digest, Sha256};
use uuid::Uuid;

// Fresh opaque response token
pub fn new_token() -> String {
    format!("cst_{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

// Hex SHA-256 of a token; only the digest is ever stored with a proposal
pub fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_digests_stable() {
        let a = new_token();
        let b = new_token();
        assert_ne!(a, b);
        assert_eq!(digest(&a), digest(&a));
        assert_ne!(digest(&a), digest(&b));
        assert_eq!(digest(&a).len(), 64);
    }
}
