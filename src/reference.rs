use ahash::AHashMap;
use serde::Serialize;

use crate::error::{HictkError, Result};

/// Ordered chromosome list with sizes (spec §3 "Reference").
///
/// Chromosome order is part of a file's identity: two references are
/// equal only if names, sizes, and order all match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    names: Vec<String>,
    lengths: Vec<u64>,
    #[serde(skip)]
    rank_of: AHashMap<String, usize>,
}

impl Reference {
    pub fn new(names: Vec<String>, lengths: Vec<u64>) -> Result<Reference> {
        if names.len() != lengths.len() {
            return Err(HictkError::BadBinTable {
                reason: "chrom name and length arrays have different lengths".into(),
            });
        }

        let mut rank_of = AHashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(HictkError::BadBinTable {
                    reason: "chromosome name must not be empty".into(),
                });
            }
            if rank_of.insert(name.clone(), i).is_some() {
                return Err(HictkError::BadBinTable {
                    reason: format!("duplicate chromosome name {name:?}"),
                });
            }
        }
        for &len in &lengths {
            if len == 0 {
                return Err(HictkError::BadBinTable {
                    reason: "chromosome length must be positive".into(),
                });
            }
        }

        Ok(Reference { names, lengths, rank_of })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    pub fn name(&self, rank: usize) -> Option<&str> {
        self.names.get(rank).map(String::as_str)
    }

    pub fn length(&self, rank: usize) -> Option<u64> {
        self.lengths.get(rank).copied()
    }

    pub fn rank_of(&self, name: &str) -> Option<usize> {
        self.rank_of.get(name).copied()
    }

    /// Two references describe the same genome only when names, sizes
    /// and order all line up (spec §3 invariant).
    pub fn reference_eq(&self, other: &Reference) -> bool {
        self.names == other.names && self.lengths == other.lengths
    }

    /// Build a new Reference by remapping chromosome names, preserving order.
    pub fn renamed(&self, mut rename: impl FnMut(&str) -> String) -> Result<Reference> {
        let names = self.names.iter().map(|n| rename(n)).collect();
        Reference::new(names, self.lengths.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Reference {
        Reference::new(
            vec!["chr1".into(), "chr2".into(), "chrX".into()],
            vec![1000, 2000, 500],
        )
        .unwrap()
    }

    #[test]
    fn rank_of_matches_insertion_order() {
        let r = sample();
        assert_eq!(r.rank_of("chr1"), Some(0));
        assert_eq!(r.rank_of("chr2"), Some(1));
        assert_eq!(r.rank_of("chrX"), Some(2));
        assert_eq!(r.rank_of("chrY"), None);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        assert!(Reference::new(vec!["chr1".into()], vec![100, 200]).is_err());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(Reference::new(vec!["".into()], vec![100]).is_err());
    }

    #[test]
    fn rejects_zero_length() {
        assert!(Reference::new(vec!["chr1".into()], vec![0]).is_err());
    }

    #[test]
    fn rejects_duplicate_name() {
        let err = Reference::new(vec!["chr1".into(), "chr1".into()], vec![100, 200]);
        assert!(err.is_err());
    }

    #[test]
    fn reference_eq_requires_same_order() {
        let a = Reference::new(vec!["chr1".into(), "chr2".into()], vec![100, 200]).unwrap();
        let b = Reference::new(vec!["chr2".into(), "chr1".into()], vec![200, 100]).unwrap();
        assert!(!a.reference_eq(&b));
        assert!(a.reference_eq(&a.clone()));
    }

    #[test]
    fn renamed_preserves_lengths_and_order() {
        let r = sample();
        let renamed = r.renamed(|n| format!("chr_{n}")).unwrap();
        assert_eq!(renamed.names(), &["chr_chr1", "chr_chr2", "chr_chrX"]);
        assert_eq!(renamed.lengths(), r.lengths());
    }
}
