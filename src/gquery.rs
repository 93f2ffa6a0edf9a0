use crate::bintable::BinTable;
use crate::error::{HictkError, Result};

/// A parsed genomic interval resolved against a Reference (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenomicRange {
    pub chrom_rank: u32,
    pub start: u64,
    pub end: u64,
}

/// Parses `chrom[:start[-end]]`, with thousands-separator commas
/// permitted in numbers. `start` defaults to 0, `end` defaults to the
/// chromosome length.
pub fn parse_range(query: &str, bins: &BinTable) -> Result<GenomicRange> {
    let reference = bins.reference();
    let bad = |reason: String| HictkError::BadRange { query: query.to_string(), reason };

    let (chrom, coords) = match query.split_once(':') {
        Some((c, rest)) => (c, Some(rest)),
        None => (query, None),
    };

    let chrom_rank = reference
        .rank_of(chrom)
        .ok_or_else(|| HictkError::UnknownChromosome { name: chrom.to_string() })? as u32;
    let chrom_len = reference.length(chrom_rank as usize).unwrap();

    let (start, end) = match coords {
        None => (0, chrom_len),
        Some(rest) => match rest.split_once('-') {
            Some((s, e)) => (parse_number(s).map_err(&bad)?, parse_number(e).map_err(&bad)?),
            None => (parse_number(rest).map_err(&bad)?, chrom_len),
        },
    };

    if end <= start {
        return Err(bad(format!("end ({end}) must be greater than start ({start})")));
    }
    if end > chrom_len {
        return Err(bad(format!(
            "end ({end}) exceeds chromosome length ({chrom_len})"
        )));
    }

    Ok(GenomicRange { chrom_rank, start, end })
}

fn parse_number(s: &str) -> std::result::Result<u64, String> {
    let cleaned: String = s.chars().filter(|&c| c != ',').collect();
    cleaned.parse::<u64>().map_err(|_| format!("{s:?} is not a valid integer"))
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::parse_number;

    fn with_thousands_separators(n: u64) -> String {
        let digits = n.to_string();
        let mut grouped = String::new();
        for (i, ch) in digits.chars().rev().enumerate() {
            if i > 0 && i % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        grouped.chars().rev().collect()
    }

    proptest! {
        /// Any `u64` survives round-tripping through comma-grouped digits,
        /// regardless of where the separators land (spec §4.2 "thousands
        /// separators permitted").
        #[test]
        fn comma_grouping_round_trips(n in any::<u64>()) {
            let grouped = with_thousands_separators(n);
            prop_assert_eq!(parse_number(&grouped), Ok(n));
        }

        /// Any run of ASCII digits, with or without interior commas, parses
        /// to the same value as stripping the commas first.
        #[test]
        fn arbitrary_comma_placement_is_ignored(n in any::<u64>(), marks in prop::collection::vec(0usize..20, 0..5)) {
            let digits = n.to_string();
            let mut with_commas = digits.clone();
            let mut offset = 0;
            for mark in marks {
                let pos = mark.min(with_commas.len());
                with_commas.insert(pos + offset, ',');
                offset += 1;
            }
            prop_assert_eq!(parse_number(&with_commas), Ok(n));
        }
    }
}

impl GenomicRange {
    /// Resolves this genomic interval to a half-open bin id range.
    pub fn to_bin_range(&self, bins: &BinTable) -> Result<(u64, u64)> {
        let lo = bins.bin_id_of(self.chrom_rank, self.start)?;
        // end is exclusive; if it lands exactly on a bin boundary that
        // bin is excluded, otherwise include the bin straddling `end`.
        let hi_pos = self.end.saturating_sub(1);
        let hi = bins.bin_id_of(self.chrom_rank, hi_pos)? + 1;
        Ok((lo, hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;

    fn bins() -> BinTable {
        let reference = Reference::new(vec!["chr1".into(), "chr2".into()], vec![1000, 500]).unwrap();
        BinTable::build_fixed(reference, 100).unwrap()
    }

    #[test]
    fn bare_chrom_spans_whole_chromosome() {
        let r = parse_range("chr1", &bins()).unwrap();
        assert_eq!(r, GenomicRange { chrom_rank: 0, start: 0, end: 1000 });
    }

    #[test]
    fn chrom_with_start_only_runs_to_end_of_chromosome() {
        let r = parse_range("chr2:200", &bins()).unwrap();
        assert_eq!(r, GenomicRange { chrom_rank: 1, start: 200, end: 500 });
    }

    #[test]
    fn chrom_with_start_and_end() {
        let r = parse_range("chr1:100-300", &bins()).unwrap();
        assert_eq!(r, GenomicRange { chrom_rank: 0, start: 100, end: 300 });
    }

    #[test]
    fn thousands_separators_are_stripped() {
        let r = parse_range("chr1:1,00-3,00", &bins()).unwrap();
        assert_eq!(r, GenomicRange { chrom_rank: 0, start: 100, end: 300 });
    }

    #[test]
    fn unknown_chromosome_errors() {
        assert!(parse_range("chrZ:0-10", &bins()).is_err());
    }

    #[test]
    fn end_before_start_errors() {
        assert!(parse_range("chr1:300-100", &bins()).is_err());
    }

    #[test]
    fn end_past_chromosome_length_errors() {
        assert!(parse_range("chr1:0-5000", &bins()).is_err());
    }

    #[test]
    fn to_bin_range_is_half_open_and_bin_aligned() {
        let bins = bins();
        let r = parse_range("chr1:100-300", &bins).unwrap();
        assert_eq!(r.to_bin_range(&bins).unwrap(), (1, 3));
    }

    #[test]
    fn to_bin_range_includes_straddled_end_bin() {
        let bins = bins();
        let r = parse_range("chr1:50-150", &bins).unwrap();
        assert_eq!(r.to_bin_range(&bins).unwrap(), (0, 2));
    }
}
