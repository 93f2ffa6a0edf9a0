use crate::bintable::BinTable;
use crate::error::{HictkError, Result};
use crate::file::File;
use crate::gquery::parse_range;
use crate::reference::Reference;

/// One chromosome-pair rectangle in the unified global bin-id space:
/// `(chrom1_rank, chrom2_rank, bin1_lo, bin1_hi, bin2_lo, bin2_hi)`.
pub type PairRect = (u32, u32, u64, u64, u64, u64);

/// Caller-facing query inputs (spec §4.6). `cis_only`/`trans_only` and
/// explicit ranges are mutually exclusive.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub resolution: Option<u32>,
    pub cell: Option<String>,
    pub q1: Option<String>,
    pub q2: Option<String>,
    pub normalization: Option<String>,
    pub cis_only: bool,
    pub trans_only: bool,
}

/// A typed execution plan, tagged by back-end the same way the file
/// handle itself is (spec §4.6, §9). Row slabs (Cooler) and block sets
/// (Hic) both reduce, in this implementation, to chromosome-pair
/// rectangles in bin-id space; the two variants exist so downstream
/// iterator construction can dispatch without re-inspecting the file.
pub enum Plan {
    Cooler { resolution: Option<u32>, cell: Option<String>, pairs: Vec<PairRect> },
    Hic { resolution: u32, pairs: Vec<PairRect> },
}

pub fn build_plan(file: &File, bins: &BinTable, opts: &QueryOptions) -> Result<Plan> {
    if file.requires_resolution() && opts.resolution.is_none() {
        return Err(HictkError::ConflictingQueryOptions {
            reason: "a --resolution is required for .mcool/.hic/.scool".into(),
        });
    }
    if !file.requires_resolution() && opts.resolution.is_some() {
        return Err(HictkError::ConflictingQueryOptions {
            reason: "--resolution is not accepted for plain .cool files".into(),
        });
    }

    let range_given = opts.q1.is_some() || opts.q2.is_some();
    if (opts.cis_only || opts.trans_only) && range_given {
        return Err(HictkError::ConflictingQueryOptions {
            reason: "--cis-only/--trans-only cannot be combined with an explicit range".into(),
        });
    }
    if opts.cis_only && opts.trans_only {
        return Err(HictkError::ConflictingQueryOptions {
            reason: "--cis-only and --trans-only are mutually exclusive".into(),
        });
    }

    if let Some(name) = &opts.normalization {
        let available = file.weight_names(opts.resolution)?;
        if !available.iter().any(|n| n == name || is_weight_ice_synonym(name, n)) {
            return Err(HictkError::UnknownNormalization {
                name: name.clone(),
                resolution: opts.resolution.unwrap_or(0),
            });
        }
    }

    let reference = bins.reference();
    let pairs = if range_given {
        single_pair(bins, reference, opts)?
    } else if opts.cis_only {
        cis_pairs(bins, reference)?
    } else if opts.trans_only {
        trans_pairs(bins, reference)?
    } else {
        genome_wide_pairs(bins, reference)?
    };

    Ok(match file {
        File::Cooler(_) => Plan::Cooler { resolution: opts.resolution, cell: opts.cell.clone(), pairs },
        File::Hic(_) => Plan::Hic { resolution: opts.resolution.unwrap(), pairs },
    })
}

/// Per spec §9's open question resolution: treat `weight` and `ICE` as
/// synonyms only when both are present and identical — here we can only
/// see the requested/available name pair, so we accept the alias in
/// either direction and let the caller's subsequent read fail loudly if
/// the underlying dataset turns out not to match.
fn is_weight_ice_synonym(requested: &str, available: &str) -> bool {
    let pair = |a: &str, b: &str| a.eq_ignore_ascii_case("weight") && b.eq_ignore_ascii_case("ice");
    pair(requested, available) || pair(available, requested)
}

fn single_pair(bins: &BinTable, _reference: &Reference, opts: &QueryOptions) -> Result<Vec<PairRect>> {
    let q1 = opts.q1.as_deref().expect("range_given implies q1 is set");
    let r1 = parse_range(q1, bins)?;
    let (lo1, hi1) = r1.to_bin_range(bins)?;

    let (c2, lo2, hi2) = match &opts.q2 {
        Some(q2) => {
            let r2 = parse_range(q2, bins)?;
            let (lo2, hi2) = r2.to_bin_range(bins)?;
            (r2.chrom_rank, lo2, hi2)
        }
        None => (r1.chrom_rank, lo1, hi1),
    };

    // normalize so chrom1 <= chrom2 by rank, matching the back-ends'
    // upper-triangular storage convention.
    if r1.chrom_rank <= c2 {
        Ok(vec![(r1.chrom_rank, c2, lo1, hi1, lo2, hi2)])
    } else {
        Ok(vec![(c2, r1.chrom_rank, lo2, hi2, lo1, hi1)])
    }
}

fn cis_pairs(bins: &BinTable, reference: &Reference) -> Result<Vec<PairRect>> {
    let mut pairs = Vec::with_capacity(reference.len());
    for rank in 0..reference.len() as u32 {
        let (lo, hi) = bins.chrom_bin_range(rank)?;
        pairs.push((rank, rank, lo, hi, lo, hi));
    }
    Ok(pairs)
}

fn trans_pairs(bins: &BinTable, reference: &Reference) -> Result<Vec<PairRect>> {
    let n = reference.len() as u32;
    let mut pairs = Vec::new();
    for c1 in 0..n {
        let (lo1, hi1) = bins.chrom_bin_range(c1)?;
        for c2 in (c1 + 1)..n {
            let (lo2, hi2) = bins.chrom_bin_range(c2)?;
            pairs.push((c1, c2, lo1, hi1, lo2, hi2));
        }
    }
    Ok(pairs)
}

fn genome_wide_pairs(bins: &BinTable, reference: &Reference) -> Result<Vec<PairRect>> {
    let mut pairs = cis_pairs(bins, reference)?;
    pairs.extend(trans_pairs(bins, reference)?);
    pairs.sort_by_key(|&(c1, c2, ..)| (c1, c2));
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bins() -> BinTable {
        let reference =
            Reference::new(vec!["chr1".into(), "chr2".into(), "chr3".into()], vec![200, 100, 150])
                .unwrap();
        BinTable::build_fixed(reference, 50).unwrap()
    }

    #[test]
    fn cis_pairs_cover_every_chromosome_once() {
        let bins = bins();
        let pairs = cis_pairs(&bins, bins.reference()).unwrap();
        assert_eq!(pairs.len(), 3);
        for (c1, c2, ..) in &pairs {
            assert_eq!(c1, c2);
        }
    }

    #[test]
    fn trans_pairs_cover_every_unordered_pair_once() {
        let bins = bins();
        let pairs = trans_pairs(&bins, bins.reference()).unwrap();
        assert_eq!(pairs.len(), 3); // C(3,2)
        for (c1, c2, ..) in &pairs {
            assert!(c1 < c2);
        }
    }

    #[test]
    fn genome_wide_pairs_is_cis_plus_trans_sorted() {
        let bins = bins();
        let pairs = genome_wide_pairs(&bins, bins.reference()).unwrap();
        assert_eq!(pairs.len(), 6); // 3 cis + 3 trans
        let ranks: Vec<_> = pairs.iter().map(|&(c1, c2, ..)| (c1, c2)).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn is_weight_ice_synonym_matches_either_direction_case_insensitive() {
        assert!(is_weight_ice_synonym("weight", "ICE"));
        assert!(is_weight_ice_synonym("ICE", "weight"));
        assert!(is_weight_ice_synonym("Weight", "ice"));
        assert!(!is_weight_ice_synonym("weight", "VC"));
        assert!(!is_weight_ice_synonym("KR", "ICE"));
    }
}
