//! Canonical storage keys for originals, sidecars and derivatives.
//!
//! Keys are relative `/`-separated paths. The hash is sharded into three
//! 3-character directories so a local backend never ends up with millions of
//! entries in one directory:
//!
//! ```text
//! {namespace}/{h[0..3]}/{h[3..6]}/{h[6..9]}/{h[9..]}/{leaf}
//! ```
//!
//! `leaf` is `original`, `info.json`, or a canonical output-spec token. Spec
//! tokens always end in an image extension, so they never collide with the two
//! reserved leaves.

use serde::Serialize;
use std::fmt;

use crate::error::PipelineError;
use crate::types::OutputSpec;

/// Leaf name of the cached original.
pub const ORIGINAL_LEAF: &str = "original";

/// Leaf name of the `ImageProperties` sidecar.
pub const SIDECAR_LEAF: &str = "info.json";

const SHARD_WIDTH: usize = 3;
const SHARD_COUNT: usize = 3;
const MIN_HASH_LEN: usize = SHARD_WIDTH * SHARD_COUNT + 1;

/// Address of a blob in a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments of the key.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps (namespace, hash, leaf) to a [`StorageKey`].
///
/// Pure and deterministic: no I/O, no process state.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    /// Key of the cached original.
    pub fn original(namespace: &str, hash: &str) -> Result<StorageKey, PipelineError> {
        Self::resolve(namespace, hash, ORIGINAL_LEAF)
    }

    /// Key of the sidecar properties file.
    pub fn sidecar(namespace: &str, hash: &str) -> Result<StorageKey, PipelineError> {
        Self::resolve(namespace, hash, SIDECAR_LEAF)
    }

    /// Key of one derivative.
    pub fn derivative(
        namespace: &str,
        hash: &str,
        spec: &OutputSpec,
    ) -> Result<StorageKey, PipelineError> {
        Self::resolve(namespace, hash, &spec.to_string())
    }

    fn resolve(namespace: &str, hash: &str, leaf: &str) -> Result<StorageKey, PipelineError> {
        if namespace.is_empty() {
            return Err(PipelineError::Validation("namespace must not be empty".into()));
        }
        if namespace.contains('/') || namespace == "." || namespace == ".." {
            return Err(PipelineError::Validation(format!(
                "namespace {namespace:?} is not a single path segment"
            )));
        }
        if hash.is_empty() {
            return Err(PipelineError::Validation("hash must not be empty".into()));
        }
        if hash.len() < MIN_HASH_LEN || !hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(PipelineError::Validation(format!(
                "hash {hash:?} must be at least {MIN_HASH_LEN} alphanumeric characters"
            )));
        }

        let mut key = String::with_capacity(namespace.len() + hash.len() + leaf.len() + 8);
        key.push_str(namespace);
        for i in 0..SHARD_COUNT {
            key.push('/');
            key.push_str(&hash[i * SHARD_WIDTH..(i + 1) * SHARD_WIDTH]);
        }
        key.push('/');
        key.push_str(&hash[SHARD_COUNT * SHARD_WIDTH..]);
        key.push('/');
        key.push_str(leaf);
        Ok(StorageKey(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;

    const HASH: &str = "31e8b3187a9f63f26d58c88bf09a7bbd";

    #[test]
    fn test_original_layout() {
        let key = PathResolver::original("avatars", HASH).unwrap();
        assert_eq!(
            key.as_str(),
            "avatars/31e/8b3/187/a9f63f26d58c88bf09a7bbd/original"
        );
        assert_eq!(key.segments().count(), 6);
    }

    #[test]
    fn test_derivative_uses_canonical_token() {
        let a = OutputSpec::parse("300x200.jpeg").unwrap();
        let b = OutputSpec::parse("300x200.jpg").unwrap();
        let ka = PathResolver::derivative("ns", HASH, &a).unwrap();
        let kb = PathResolver::derivative("ns", HASH, &b).unwrap();
        assert_eq!(ka, kb);
        assert!(ka.as_str().ends_with("/300x200.jpg"));
    }

    #[test]
    fn test_sidecar_distinct_from_original() {
        let original = PathResolver::original("ns", HASH).unwrap();
        let sidecar = PathResolver::sidecar("ns", HASH).unwrap();
        assert_ne!(original, sidecar);
    }

    #[test]
    fn test_rejects_structurally_invalid_inputs() {
        assert!(PathResolver::original("", HASH).is_err());
        assert!(PathResolver::original("ns", "").is_err());
        assert!(PathResolver::original("a/b", HASH).is_err());
        assert!(PathResolver::original("ns", "short").is_err());
        assert!(PathResolver::original("ns", "31e8b3187a9f/3f26d58c88bf09a7bbd").is_err());
    }

    #[test]
    fn test_keys_deterministic_and_injective_over_corpus() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let namespaces = ["a", "ab", "b", "avatars", "avatars-v2", "x", "31e"];
        let specs: Vec<OutputSpec> = [
            "full_size.jpg",
            "full_size.png",
            "x300.jpg",
            "x30.jpg",
            "w300.webp",
            "300x200.jpg",
            "30x200.jpg",
            "300x20.jpg",
            "300x200-q80.jpg",
        ]
        .iter()
        .map(|t| OutputSpec::parse(t).unwrap())
        .collect();

        let mut seen: HashMap<StorageKey, (String, String, String)> = HashMap::new();
        for _ in 0..40 {
            let hash: String = (0..32)
                .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap())
                .collect();
            for ns in namespaces {
                let mut leaves: Vec<(String, StorageKey)> = specs
                    .iter()
                    .map(|s| (s.to_string(), PathResolver::derivative(ns, &hash, s).unwrap()))
                    .collect();
                leaves.push((ORIGINAL_LEAF.into(), PathResolver::original(ns, &hash).unwrap()));
                leaves.push((SIDECAR_LEAF.into(), PathResolver::sidecar(ns, &hash).unwrap()));

                for (leaf, key) in leaves {
                    let triple = (ns.to_string(), hash.clone(), leaf.clone());
                    let again = match leaf.as_str() {
                        ORIGINAL_LEAF => PathResolver::original(ns, &hash).unwrap(),
                        SIDECAR_LEAF => PathResolver::sidecar(ns, &hash).unwrap(),
                        _ => PathResolver::derivative(ns, &hash, &OutputSpec::parse(&leaf).unwrap())
                            .unwrap(),
                    };
                    assert_eq!(key, again);
                    if let Some(prev) = seen.insert(key.clone(), triple.clone()) {
                        assert_eq!(prev, triple, "collision on {key}");
                    }
                }
            }
        }
    }
}
