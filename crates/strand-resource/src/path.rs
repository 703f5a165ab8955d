//! Resource paths and type identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

fn fold(hash: u64) -> u32 {
    (hash ^ (hash >> 32)) as u32
}

/// Normalize a path for hashing: forward slashes, lowercase, no leading `./`
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/").to_lowercase();
    unified.trim_start_matches("./").to_string()
}

/// Path of a resource plus its stable hash
///
/// Two spellings of the same path (`Textures\A.tex`, `textures/a.tex`) hash
/// identically; the original spelling is kept for I/O and diagnostics.
#[derive(Clone, Debug, Eq)]
pub struct ResourcePath {
    path: Arc<str>,
    hash: u32,
}

impl ResourcePath {
    /// Create a path, computing its hash
    pub fn new(path: impl AsRef<str>) -> Self {
        let path = path.as_ref();
        Self {
            hash: fold(xxh3_64(normalize_path(path).as_bytes())),
            path: Arc::from(path),
        }
    }

    /// The path as given
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Stable 32-bit hash of the normalized path
    pub fn hash(&self) -> u32 {
        self.hash
    }
}

impl PartialEq for ResourcePath {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for ResourcePath {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl From<&str> for ResourcePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Identifier of a resource type: the hash of its name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType(u32);

impl ResourceType {
    /// Type identifier for `name`
    pub fn of(name: &str) -> Self {
        Self(fold(xxh3_64(name.as_bytes())))
    }

    /// Raw 32-bit value
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_spellings_match() {
        let a = ResourcePath::new("Textures\\Stone.TEX");
        let b = ResourcePath::new("./textures/stone.tex");
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.as_str(), "Textures\\Stone.TEX");
    }

    #[test]
    fn test_different_paths_differ() {
        assert_ne!(ResourcePath::new("a.txt"), ResourcePath::new("b.txt"));
    }

    #[test]
    fn test_type_ids_are_stable() {
        assert_eq!(ResourceType::of("texture"), ResourceType::of("texture"));
        assert_ne!(ResourceType::of("texture"), ResourceType::of("mesh"));
        assert_eq!(ResourceType::of("mesh").to_string().len(), 8);
    }
}
