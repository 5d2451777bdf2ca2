//! Stable content-addressed concept identity.
//!
//! A concept's id is the SHA-256 digest of its trimmed name, truncated to a
//! 16-hex-character prefix (64 bits). The derivation is pure and identical
//! across storage engines and process restarts, so data written by one engine
//! stays addressable by another after migration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Length of the hex id prefix kept from the full digest.
const ID_HEX_LEN: usize = 16;

/// Derive the stable id for a concept name.
///
/// Trims surrounding whitespace; no other normalization. Callers wanting
/// case/whitespace-insensitive merging should normalize first (or use
/// [`IdentityConfig::concept_id`] with `case_fold` enabled).
pub fn concept_id(name: &str) -> String {
    let digest = Sha256::digest(name.trim().as_bytes());
    let mut hex = String::with_capacity(ID_HEX_LEN);
    for byte in digest.iter().take(ID_HEX_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Normalization policy for concept names.
///
/// By default only trimming is applied, so "Async IO" and "async io" remain
/// distinct concepts. With `case_fold` enabled, names are NFC-normalized and
/// lowercased before hashing, merging case variants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// NFC-normalize and lowercase names before hashing.
    #[serde(default)]
    pub case_fold: bool,
}

impl IdentityConfig {
    /// Derive a concept id under this normalization policy.
    pub fn concept_id(&self, name: &str) -> String {
        if self.case_fold {
            let folded: String = name.trim().nfc().collect::<String>().to_lowercase();
            concept_id(&folded)
        } else {
            concept_id(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(concept_id("Async IO"), concept_id("Async IO"));
    }

    #[test]
    fn fixed_length_hex() {
        let id = concept_id("generics");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(concept_id("  ownership  "), concept_id("ownership"));
    }

    #[test]
    fn distinct_names_do_not_collide() {
        let titles = [
            "Ownership",
            "Borrowing",
            "Lifetimes",
            "Async IO",
            "async io",
            "Trait objects",
            "Pattern matching",
            "Error handling",
        ];
        let ids: std::collections::HashSet<_> = titles.iter().map(|t| concept_id(t)).collect();
        assert_eq!(ids.len(), titles.len());
    }

    #[test]
    fn case_fold_merges_variants() {
        let cfg = IdentityConfig { case_fold: true };
        assert_eq!(cfg.concept_id("Async IO"), cfg.concept_id("async io"));
        // Default policy keeps them apart.
        let plain = IdentityConfig::default();
        assert_ne!(plain.concept_id("Async IO"), plain.concept_id("async io"));
    }
}
