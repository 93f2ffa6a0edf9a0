use crate::bintable::BinTable;
use crate::error::Result;
use crate::pixels::Pixel;

use super::reader::HicFile;

/// Fetches pixels for one chromosome pair at one resolution, translating
/// block-local bin coordinates to the unified global `bin_id` space via
/// the BinTable's chromosome offsets, and reflecting across the diagonal
/// for intra-chromosomal blocks per spec §4.5's edge-case note.
pub struct HicSelector<'a> {
    file: &'a HicFile,
}

impl<'a> HicSelector<'a> {
    pub fn new(file: &'a HicFile) -> HicSelector<'a> {
        HicSelector { file }
    }

    /// All pixels with `bin1 ∈ [lo1, hi1)` and `bin2 ∈ [lo2, hi2)` in the
    /// global bin-id space, restricted to one chromosome pair.
    pub fn fetch(
        &self,
        bins: &BinTable,
        resolution: u32,
        chrom1_rank: u32,
        chrom2_rank: u32,
        lo1: u64,
        hi1: u64,
        lo2: u64,
        hi2: u64,
    ) -> Result<Vec<Pixel>> {
        let zoom = match self.file.matrix_zoom_data(chrom1_rank, chrom2_rank, resolution)? {
            Some(z) => z,
            None => return Ok(Vec::new()),
        };

        let (offset1, _) = bins.chrom_bin_range(chrom1_rank)?;
        let (offset2, _) = bins.chrom_bin_range(chrom2_rank)?;
        let is_intra = chrom1_rank == chrom2_rank;

        let mut out = Vec::new();
        for entry in zoom.block_map.values() {
            for rec in self.file.read_block(entry)? {
                let mut g1 = offset1 + rec.bin1 as u64;
                let mut g2 = offset2 + rec.bin2 as u64;
                if is_intra && g1 > g2 {
                    std::mem::swap(&mut g1, &mut g2);
                }

                let direct = g1 >= lo1 && g1 < hi1 && g2 >= lo2 && g2 < hi2;
                let mirrored = is_intra && g2 >= lo1 && g2 < hi1 && g1 >= lo2 && g1 < hi2;

                if direct {
                    out.push(Pixel { bin1_id: g1, bin2_id: g2, count: rec.count as f64 });
                } else if mirrored && g1 != g2 {
                    out.push(Pixel { bin1_id: g2, bin2_id: g1, count: rec.count as f64 });
                }
            }
        }

        out.sort_by_key(|p| (p.bin1_id, p.bin2_id));
        out.dedup_by_key(|p| (p.bin1_id, p.bin2_id));
        Ok(out)
    }
}
