use crate::bintable::BinTable;
use crate::error::Result;

/// A non-zero matrix entry (spec §3 "Pixel"). `count` holds a raw u32
/// losslessly widened to f64 when no normalization is bound, or a
/// balanced/aggregated value otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub bin1_id: u64,
    pub bin2_id: u64,
    pub count: f64,
}

/// The `--join` variant: bin ids replaced by their genomic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedPixel {
    pub chrom1: String,
    pub start1: u64,
    pub end1: u64,
    pub chrom2: String,
    pub start2: u64,
    pub end2: u64,
    pub count: f64,
}

impl Pixel {
    pub fn join(&self, bins: &BinTable) -> Result<JoinedPixel> {
        let c1 = bins.coords_of(self.bin1_id)?;
        let c2 = bins.coords_of(self.bin2_id)?;
        let reference = bins.reference();
        Ok(JoinedPixel {
            chrom1: reference.name(c1.chrom_rank as usize).unwrap().to_string(),
            start1: c1.start,
            end1: c1.end,
            chrom2: reference.name(c2.chrom_rank as usize).unwrap().to_string(),
            start2: c2.start,
            end2: c2.end,
            count: self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;

    fn bins() -> BinTable {
        let reference =
            Reference::new(vec!["chr1".into(), "chr2".into()], vec![250, 100]).unwrap();
        BinTable::build_fixed(reference, 100).unwrap()
    }

    #[test]
    fn join_translates_bin_ids_to_coordinates() {
        let bins = bins();
        let px = Pixel { bin1_id: 0, bin2_id: 2, count: 4.0 };
        let joined = px.join(&bins).unwrap();
        assert_eq!(joined.chrom1, "chr1");
        assert_eq!((joined.start1, joined.end1), (0, 100));
        assert_eq!(joined.chrom2, "chr1");
        assert_eq!((joined.start2, joined.end2), (200, 250));
        assert_eq!(joined.count, 4.0);
    }

    #[test]
    fn join_out_of_range_bin_errors() {
        let bins = bins();
        let px = Pixel { bin1_id: 0, bin2_id: 999, count: 1.0 };
        assert!(px.join(&bins).is_err());
    }
}
