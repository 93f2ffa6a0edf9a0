use itertools::Itertools;

use crate::error::{HictkError, Result};
use crate::reference::Reference;

/// A single bin's coordinates: chromosome rank plus a half-open [start, end) interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinCoords {
    pub chrom_rank: u32,
    pub start: u64,
    pub end: u64,
}

/// Ordered bin table over a Reference, either uniform-width or explicit (spec §3 "BinTable").
///
/// Mirrors the teacher's `ResGrpBuilder::build_tig_offsets` /
/// `build_bin_table_from_lengths` (hic-matrix/src/builders/res_grp_builder.rs),
/// generalized to also support variable-width bins and O(log n) coordinate lookup.
#[derive(Debug, Clone)]
pub enum BinTable {
    Fixed {
        reference: Reference,
        bin_size: u64,
        /// First bin id of each chromosome, length == n_chroms + 1.
        chrom_offsets: Vec<u64>,
    },
    Variable {
        reference: Reference,
        chrom_rank: Vec<u32>,
        start: Vec<u64>,
        end: Vec<u64>,
        /// First bin id of each chromosome, length == n_chroms + 1.
        chrom_offsets: Vec<u64>,
    },
}

impl BinTable {
    pub fn build_fixed(reference: Reference, bin_size: u64) -> Result<BinTable> {
        if bin_size == 0 {
            return Err(HictkError::BadBinTable { reason: "bin_size must be > 0".into() });
        }
        let mut chrom_offsets = Vec::with_capacity(reference.len() + 1);
        let mut count = 0u64;
        for &len in reference.lengths() {
            chrom_offsets.push(count);
            count += (len + bin_size - 1) / bin_size;
        }
        chrom_offsets.push(count);
        Ok(BinTable::Fixed { reference, bin_size, chrom_offsets })
    }

    pub fn build_variable(
        reference: Reference,
        triples: Vec<(u32, u64, u64)>,
    ) -> Result<BinTable> {
        let mut chrom_rank = Vec::with_capacity(triples.len());
        let mut start = Vec::with_capacity(triples.len());
        let mut end = Vec::with_capacity(triples.len());
        let mut chrom_offsets = vec![0u64; reference.len() + 1];

        let mut prev_rank: Option<u32> = None;
        let mut prev_end = 0u64;
        for (rank, s, e) in triples.into_iter() {
            if e <= s {
                return Err(HictkError::BadBinTable {
                    reason: format!("bin [{s}, {e}) is empty or inverted"),
                });
            }
            match prev_rank {
                Some(pr) if pr == rank => {
                    if s != prev_end {
                        return Err(HictkError::BadBinTable {
                            reason: format!(
                                "bins for chromosome {rank} are not contiguous at {s}"
                            ),
                        });
                    }
                }
                Some(pr) if rank < pr => {
                    return Err(HictkError::BadBinTable {
                        reason: "bins are not sorted by chromosome rank".into(),
                    });
                }
                _ => {
                    if s != 0 {
                        return Err(HictkError::BadBinTable {
                            reason: format!("first bin of chromosome {rank} must start at 0"),
                        });
                    }
                }
            }

            let limit = reference.length(rank as usize).ok_or_else(|| HictkError::BadBinTable {
                reason: format!("bin table references unknown chromosome rank {rank}"),
            })?;
            if e > limit {
                return Err(HictkError::BadBinTable {
                    reason: format!("bin end {e} exceeds chromosome length {limit}"),
                });
            }

            chrom_rank.push(rank);
            start.push(s);
            end.push(e);
            prev_rank = Some(rank);
            prev_end = e;
        }

        for (bin_id, &rank) in chrom_rank.iter().enumerate() {
            chrom_offsets[rank as usize + 1] = (bin_id + 1) as u64;
        }
        // fill forward so empty chromosomes inherit the running offset
        for i in 1..chrom_offsets.len() {
            if chrom_offsets[i] < chrom_offsets[i - 1] {
                chrom_offsets[i] = chrom_offsets[i - 1];
            }
        }

        Ok(BinTable::Variable { reference, chrom_rank, start, end, chrom_offsets })
    }

    pub fn reference(&self) -> &Reference {
        match self {
            BinTable::Fixed { reference, .. } => reference,
            BinTable::Variable { reference, .. } => reference,
        }
    }

    pub fn bin_size(&self) -> Option<u64> {
        match self {
            BinTable::Fixed { bin_size, .. } => Some(*bin_size),
            BinTable::Variable { .. } => None,
        }
    }

    pub fn chrom_offsets(&self) -> &[u64] {
        match self {
            BinTable::Fixed { chrom_offsets, .. } => chrom_offsets,
            BinTable::Variable { chrom_offsets, .. } => chrom_offsets,
        }
    }

    pub fn len(&self) -> usize {
        *self.chrom_offsets().last().unwrap_or(&0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// O(1) for fixed bins via prefix-sum arithmetic; O(log n) for
    /// variable bins via binary search (spec §4.1).
    pub fn coords_of(&self, bin_id: u64) -> Result<BinCoords> {
        if bin_id >= self.len() as u64 {
            return Err(HictkError::IndexOutOfBounds {
                reason: format!("bin_id {bin_id} out of range (n_bins={})", self.len()),
            });
        }
        match self {
            BinTable::Fixed { reference, bin_size, chrom_offsets } => {
                let rank = match chrom_offsets.binary_search(&bin_id) {
                    Ok(r) => r,
                    Err(r) => r - 1,
                };
                let local = bin_id - chrom_offsets[rank];
                let start = local * bin_size;
                let end = (start + bin_size).min(reference.length(rank).unwrap());
                Ok(BinCoords { chrom_rank: rank as u32, start, end })
            }
            BinTable::Variable { chrom_rank, start, end, .. } => {
                let i = bin_id as usize;
                Ok(BinCoords { chrom_rank: chrom_rank[i], start: start[i], end: end[i] })
            }
        }
    }

    /// Maps a base-pair position to its enclosing bin; a position equal
    /// to the chromosome length maps one past the last bin of that
    /// chromosome (half-open upper bound, spec §4.1 tie-break).
    pub fn bin_id_of(&self, chrom_rank: u32, pos: u64) -> Result<u64> {
        let offsets = self.chrom_offsets();
        let rank = chrom_rank as usize;
        if rank + 1 >= offsets.len() {
            return Err(HictkError::UnknownChromosome { name: format!("rank {chrom_rank}") });
        }
        let lo = offsets[rank];
        let hi = offsets[rank + 1];

        match self {
            BinTable::Fixed { reference, bin_size, .. } => {
                if pos == reference.length(rank).unwrap() {
                    Ok(hi)
                } else {
                    Ok(lo + pos / bin_size)
                }
            }
            BinTable::Variable { start, .. } => {
                let local = start[lo as usize..hi as usize].partition_point(|&s| s <= pos);
                Ok(lo + local as u64 - 1)
            }
        }
    }

    /// All bin_ids belonging to a chromosome, as a half-open range.
    pub fn chrom_bin_range(&self, chrom_rank: u32) -> Result<(u64, u64)> {
        let offsets = self.chrom_offsets();
        let rank = chrom_rank as usize;
        if rank + 1 >= offsets.len() {
            return Err(HictkError::UnknownChromosome { name: format!("rank {chrom_rank}") });
        }
        Ok((offsets[rank], offsets[rank + 1]))
    }

    /// Flat (chrom_rank, start, end) columns, as stored on disk by the
    /// Cooler `bins/` group.
    pub fn to_columns(&self) -> (Vec<u32>, Vec<u64>, Vec<u64>) {
        match self {
            BinTable::Variable { chrom_rank, start, end, .. } => {
                (chrom_rank.clone(), start.clone(), end.clone())
            }
            BinTable::Fixed { reference, bin_size, .. } => {
                let mut chrom_rank = Vec::with_capacity(self.len());
                let mut start = Vec::with_capacity(self.len());
                let mut end = Vec::with_capacity(self.len());
                for (rank, &len) in reference.lengths().iter().enumerate() {
                    let n_bins = (len + bin_size - 1) / bin_size;
                    for (lo, hi) in (0..=n_bins)
                        .map(|i| if i != n_bins { i * bin_size } else { len })
                        .tuple_windows()
                    {
                        chrom_rank.push(rank as u32);
                        start.push(lo);
                        end.push(hi);
                    }
                }
                (chrom_rank, start, end)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Reference {
        Reference::new(vec!["chr1".into(), "chr2".into()], vec![250, 100]).unwrap()
    }

    #[test]
    fn fixed_bins_last_bin_per_chrom_is_shorter() {
        let bins = BinTable::build_fixed(reference(), 100).unwrap();
        // chr1 (250bp) -> bins [0,100) [100,200) [200,250); chr2 (100bp) -> bin [0,100)
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.coords_of(2).unwrap(), BinCoords { chrom_rank: 0, start: 200, end: 250 });
        assert_eq!(bins.coords_of(3).unwrap(), BinCoords { chrom_rank: 1, start: 0, end: 100 });
    }

    #[test]
    fn fixed_bin_size_zero_is_rejected() {
        assert!(BinTable::build_fixed(reference(), 0).is_err());
    }

    #[test]
    fn bin_id_of_position_at_chrom_length_is_one_past_last_bin() {
        let bins = BinTable::build_fixed(reference(), 100).unwrap();
        assert_eq!(bins.bin_id_of(0, 250).unwrap(), 3);
        assert_eq!(bins.bin_id_of(0, 249).unwrap(), 2);
    }

    #[test]
    fn coords_of_out_of_range_errors() {
        let bins = BinTable::build_fixed(reference(), 100).unwrap();
        assert!(bins.coords_of(bins.len() as u64).is_err());
    }

    #[test]
    fn chrom_bin_range_matches_offsets() {
        let bins = BinTable::build_fixed(reference(), 100).unwrap();
        assert_eq!(bins.chrom_bin_range(0).unwrap(), (0, 3));
        assert_eq!(bins.chrom_bin_range(1).unwrap(), (3, 4));
    }

    #[test]
    fn variable_bins_round_trip_through_coords() {
        let triples = vec![(0, 0, 100), (0, 100, 250), (1, 0, 100)];
        let bins = BinTable::build_variable(reference(), triples).unwrap();
        assert_eq!(bins.len(), 3);
        assert_eq!(bins.coords_of(1).unwrap(), BinCoords { chrom_rank: 0, start: 100, end: 250 });
        assert_eq!(bins.bin_id_of(1, 50).unwrap(), 2);
    }

    #[test]
    fn variable_bins_reject_non_contiguous_gap() {
        let triples = vec![(0, 0, 100), (0, 150, 250)];
        assert!(BinTable::build_variable(reference(), triples).is_err());
    }

    #[test]
    fn variable_bins_reject_overlap() {
        let triples = vec![(0, 0, 100), (0, 50, 150)];
        assert!(BinTable::build_variable(reference(), triples).is_err());
    }

    #[test]
    fn variable_bins_reject_out_of_chrom_order() {
        let triples = vec![(1, 0, 100), (0, 0, 100)];
        assert!(BinTable::build_variable(reference(), triples).is_err());
    }

    #[test]
    fn fixed_to_columns_matches_coords() {
        let bins = BinTable::build_fixed(reference(), 100).unwrap();
        let (chrom, start, end) = bins.to_columns();
        assert_eq!(chrom, vec![0, 0, 0, 1]);
        assert_eq!(start, vec![0, 100, 200, 0]);
        assert_eq!(end, vec![100, 200, 250, 100]);
    }
}
