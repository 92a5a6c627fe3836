//! Hypervector codec
//!
//! Deterministic text-to-hypervector encoding plus the VSA algebra the
//! memory core is built on: `bind` (elementwise product), `bundle`
//! (elementwise mean), `unbind` (elementwise quotient) and cosine
//! `similarity`.
//!
//! Determinism matters more here than it usually does: persisted memory
//! snapshots store only text, and vectors are recomputed on load. Token
//! seeds therefore derive from SHA-256 (stable across platforms and
//! processes), and generation draws from a seeded `StdRng`.
//!
//! `unbind` is intentionally noisy. Recovering the clean filler is the
//! job of the memory store's `cleanup` operator, not of this module.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// A fixed-length real-valued vector, the atomic unit of VSA memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hypervector(pub Vec<f64>);

impl Hypervector {
    /// The zero vector of the given dimensionality
    pub fn zero(dim: usize) -> Self {
        Hypervector(vec![0.0; dim])
    }

    /// Vector length
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Euclidean norm
    pub fn norm(&self) -> f64 {
        self.0.iter().map(|v| v * v).sum::<f64>().sqrt()
    }
}

/// Derive a stable seed for a token.
///
/// First 8 bytes of `SHA-256(token)`, big-endian. Unlike `DefaultHasher`,
/// this does not vary across processes or std versions.
pub fn stable_token_seed(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Generate a deterministic bipolar {-1, +1} hypervector from a seed.
///
/// Same seed and dimensionality produce an identical vector across runs
/// and processes.
pub fn generate_hypervector(seed: u64, dim: usize) -> Hypervector {
    let mut rng = StdRng::seed_from_u64(seed);
    Hypervector((0..dim).map(|_| if rng.gen::<bool>() { 1.0 } else { -1.0 }).collect())
}

/// Tokenize text the way the encoder sees it: lowercase, split on
/// non-alphanumeric runs, drop tokens of length <= 2, deduplicate.
///
/// Returns a `BTreeSet` so bundling order is stable regardless of input
/// order.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

/// Encode text into a hypervector by bundling per-token vectors.
///
/// Empty input (or input with no surviving tokens) returns the seed-0
/// vector rather than the zero vector, so every encode result has full
/// norm and participates in cosine ranking.
pub fn encode_text(text: &str, dim: usize) -> Hypervector {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return generate_hypervector(0, dim);
    }
    let vectors: Vec<Hypervector> = tokens
        .iter()
        .map(|t| generate_hypervector(stable_token_seed(t), dim))
        .collect();
    bundle(&vectors)
}

/// Bind two hypervectors (elementwise product).
///
/// Commutative and associative; the all-ones vector is the identity, and
/// bipolar vectors are self-inverse.
pub fn bind(a: &Hypervector, b: &Hypervector) -> Hypervector {
    Hypervector(a.0.iter().zip(b.0.iter()).map(|(x, y)| x * y).collect())
}

/// Bundle hypervectors (elementwise mean).
///
/// The result stays similar to each input. An empty slice yields the
/// zero vector of length 0.
pub fn bundle(vectors: &[Hypervector]) -> Hypervector {
    let Some(first) = vectors.first() else {
        return Hypervector::zero(0);
    };
    let dim = first.dim();
    let mut sum = vec![0.0; dim];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v.0.iter()) {
            *acc += x;
        }
    }
    let n = vectors.len() as f64;
    Hypervector(sum.into_iter().map(|x| x / n).collect())
}

/// Unbind a composite with a key (elementwise quotient where the key is
/// nonzero, else 0).
///
/// The output is noisy: bundling mixed other role-filler pairs into the
/// composite, and the quotient cannot separate them again. Callers follow
/// with the memory store's `cleanup` to snap to the nearest clean
/// prototype.
pub fn unbind(composite: &Hypervector, key: &Hypervector) -> Hypervector {
    Hypervector(
        composite
            .0
            .iter()
            .zip(key.0.iter())
            .map(|(c, k)| if *k != 0.0 { c / k } else { 0.0 })
            .collect(),
    )
}

/// Cosine similarity in [-1, 1]; 0 when either operand has zero norm.
pub fn similarity(a: &Hypervector, b: &Hypervector) -> f64 {
    let na = a.norm();
    let nb = b.norm();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let dot: f64 = a.0.iter().zip(b.0.iter()).map(|(x, y)| x * y).sum();
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIM: usize = 256;

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate_hypervector(42, DIM);
        let b = generate_hypervector(42, DIM);
        assert_eq!(a, b);
        assert!(a.0.iter().all(|v| *v == 1.0 || *v == -1.0));
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = generate_hypervector(1, DIM);
        let b = generate_hypervector(2, DIM);
        assert_ne!(a, b);
        // Random bipolar vectors should be near-orthogonal
        assert!(similarity(&a, &b).abs() < 0.3);
    }

    #[test]
    fn test_stable_token_seed_is_stable() {
        assert_eq!(stable_token_seed("alpha"), stable_token_seed("alpha"));
        assert_ne!(stable_token_seed("alpha"), stable_token_seed("beta"));
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        let tokens = tokenize("The cat, a CAT-42 sat!");
        assert!(tokens.contains("cat"));
        assert!(tokens.contains("sat"));
        assert!(tokens.contains("the"));
        assert!(!tokens.contains("a"));
        assert!(!tokens.contains("42"));
        // "cat" appears twice but is deduplicated
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = encode_text("hello hypervector world", DIM);
        let b = encode_text("hello hypervector world", DIM);
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_empty_returns_seed_zero() {
        assert_eq!(encode_text("", DIM), generate_hypervector(0, DIM));
        assert_eq!(encode_text("a b c", DIM), generate_hypervector(0, DIM));
    }

    #[test]
    fn test_bind_identity_and_self_inverse() {
        let a = generate_hypervector(7, DIM);
        let ones = Hypervector(vec![1.0; DIM]);
        assert_eq!(bind(&a, &ones), a);
        // Bipolar vectors are self-inverse under bind
        assert_eq!(bind(&a, &a), ones);
    }

    #[test]
    fn test_bundle_preserves_similarity() {
        let a = generate_hypervector(1, DIM);
        let b = generate_hypervector(2, DIM);
        let c = generate_hypervector(3, DIM);
        let composite = bundle(&[a.clone(), b.clone(), c.clone()]);
        for v in [&a, &b, &c] {
            assert!(similarity(&composite, v) > 0.3);
        }
    }

    #[test]
    fn test_unbind_recovers_noisy_filler() {
        let role = generate_hypervector(10, DIM);
        let filler = generate_hypervector(11, DIM);
        let other = bind(
            &generate_hypervector(12, DIM),
            &generate_hypervector(13, DIM),
        );
        let composite = bundle(&[bind(&role, &filler), other]);
        let noisy = unbind(&composite, &role);
        // Closer to the bound filler than to an unrelated vector
        let unrelated = generate_hypervector(99, DIM);
        assert!(similarity(&noisy, &filler) > similarity(&noisy, &unrelated));
        // But still noisy: well below a clean match
        assert!(similarity(&noisy, &filler) < 0.999);
    }

    #[test]
    fn test_similarity_bounds() {
        let a = generate_hypervector(5, DIM);
        let b = generate_hypervector(6, DIM);
        let s = similarity(&a, &b);
        assert!((-1.0..=1.0).contains(&s));
        assert!(similarity(&a, &a) >= s);
        assert_eq!(similarity(&a, &Hypervector::zero(DIM)), 0.0);
    }
}
