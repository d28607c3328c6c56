//! Deterministic lookup key for an issuer/subject pair.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hex SHA-256 digest of an `(issuer, subject)` pair.
///
/// The issuer is length-prefixed before hashing so that no two distinct
/// pairs share an input, whatever characters they contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn compute(issuer: &str, subject: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((issuer.len() as u64).to_be_bytes());
        hasher.update(issuer.as_bytes());
        hasher.update(subject.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps a fingerprint read back from the mapping store.
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_pair_same_fingerprint() {
        let a = Fingerprint::compute("https://idp.example", "abc123");
        let b = Fingerprint::compute("https://idp.example", "abc123");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn many_pairs_never_collide() {
        let mut seen = HashSet::new();
        for issuer in 0..50 {
            for subject in 0..200 {
                let issuer = format!("https://idp{issuer}.example");
                let subject = format!("user-{subject}");
                let fp = Fingerprint::compute(&issuer, &subject);
                assert_eq!(fp, Fingerprint::compute(&issuer, &subject));
                assert!(seen.insert(fp), "collision for {issuer}/{subject}");
            }
        }
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn shifting_the_boundary_changes_the_fingerprint() {
        assert_ne!(
            Fingerprint::compute("a-b", "c"),
            Fingerprint::compute("a", "b-c")
        );
        assert_ne!(Fingerprint::compute("ab", ""), Fingerprint::compute("a", "b"));
    }

    #[test]
    fn subject_is_scoped_to_issuer() {
        assert_ne!(
            Fingerprint::compute("https://one.example", "42"),
            Fingerprint::compute("https://two.example", "42")
        );
    }

    #[test]
    fn display_matches_hex() {
        let fp = Fingerprint::compute("iss", "sub");
        assert_eq!(fp.to_string(), fp.as_str());
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
