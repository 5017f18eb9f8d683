use rustc_hash::FxHashMap;

use crate::demux::error::{DemuxError, Result};

/// One genomic variant position used as an evidentiary marker,
/// identified by chromosome and position. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variant {
    pub chrom: String,
    pub pos: u64,
}

impl Variant {
    /// Parse a composite "chrom:pos" key
    pub fn parse(key: &str) -> Result<Variant> {
        let Some((chrom, pos)) = key.split_once(':') else {
            return Err(DemuxError::VariantKeyParse {
                key: key.to_string(),
                reason: "missing ':' separator".to_string(),
            });
        };
        if chrom.is_empty() {
            return Err(DemuxError::VariantKeyParse {
                key: key.to_string(),
                reason: "empty chromosome field".to_string(),
            });
        }
        let pos: u64 = pos.parse().map_err(|_| DemuxError::VariantKeyParse {
            key: key.to_string(),
            reason: format!("position '{}' is not a non-negative integer", pos),
        })?;
        Ok(Variant {
            chrom: chrom.to_string(),
            pos,
        })
    }

    /// Composite key as it appears in input and output tables
    pub fn key(&self) -> String {
        format!("{}:{}", self.chrom, self.pos)
    }
}

/// Deduplicated, ordered collection of variants. The position of a variant
/// in this registry is the canonical integer index used to address all
/// per-variant vectors and matrices; string keys are only parsed once,
/// at registration.
#[derive(Debug, Clone, Default)]
pub struct VariantRegistry {
    variants: Vec<Variant>,
    index: FxHashMap<String, usize>,
}

impl VariantRegistry {
    pub fn new() -> Self {
        Self {
            variants: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Register a "chrom:pos" key and return its index. Re-registering an
    /// existing key is a no-op that returns the index of first occurrence.
    pub fn register(&mut self, key: &str) -> Result<usize> {
        let variant = Variant::parse(key)?;
        let normalized = variant.key();
        if let Some(&i) = self.index.get(&normalized) {
            return Ok(i);
        }
        let i = self.variants.len();
        self.index.insert(normalized, i);
        self.variants.push(variant);
        Ok(i)
    }

    /// Index of an already-registered key, if any
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, index: usize) -> Option<&Variant> {
        self.variants.get(index)
    }

    /// Variants in first-seen order, aligned with the canonical index
    pub fn ordered_positions(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_key() {
        let v = Variant::parse("chr1:12345").unwrap();
        assert_eq!(v.chrom, "chr1");
        assert_eq!(v.pos, 12345);
        assert_eq!(v.key(), "chr1:12345");
    }

    #[test]
    fn test_parse_missing_separator() {
        let e = Variant::parse("chr112345").unwrap_err();
        assert!(matches!(e, DemuxError::VariantKeyParse { .. }));
    }

    #[test]
    fn test_parse_non_numeric_position() {
        let e = Variant::parse("chr1:abc").unwrap_err();
        assert!(matches!(e, DemuxError::VariantKeyParse { .. }));
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut reg = VariantRegistry::new();
        let a = reg.register("chr1:100").unwrap();
        let b = reg.register("chr2:200").unwrap();
        let a_again = reg.register("chr1:100").unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(a_again, 0);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_first_seen_ordering() {
        let mut reg = VariantRegistry::new();
        for key in ["chr2:5", "chr1:9", "chr2:5", "chr1:1"] {
            reg.register(key).unwrap();
        }
        let keys: Vec<String> = reg.ordered_positions().map(|v| v.key()).collect();
        assert_eq!(keys, vec!["chr2:5", "chr1:9", "chr1:1"]);
        assert_eq!(reg.index_of("chr1:9"), Some(1));
    }
}
