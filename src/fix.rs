//! `fix-mcool` (spec §6, S6; SPEC_FULL.md "Supplemented features"):
//! rebuilds a resolution's `bin1_offset`/`chrom_offset` index from its
//! raw pixel table whenever the on-disk index fails the monotonicity
//! check `validate` performs, leaving already-healthy resolutions
//! untouched in content (every resolution is still rewritten into the
//! output container, since `.mcool` containers share no write-in-place
//! surface here; only the index bytes differ for a resolution that
//! needed no fix).

use log::{info, warn};

use crate::bintable::BinTable;
use crate::cooler::writer::Compression;
use crate::cooler::{CoolerFile, CoolerFlavor, CoolerWriter};
use crate::error::Result;
use crate::pixels::Pixel;

#[derive(Debug, Clone, PartialEq)]
pub struct FixReport {
    pub resolution: Option<u32>,
    pub was_broken: bool,
}

/// Rewrites every resolution of `input` into a fresh container at
/// `output_path`, rebuilding the `bin1_offset` index for any resolution
/// whose on-disk index is not monotonically non-decreasing.
pub fn fix_mcool(input: &CoolerFile, output_path: &std::path::Path, compression: Compression) -> Result<Vec<FixReport>> {
    let writer = CoolerWriter::create(output_path, compression)?;
    let reference = input.reference(None)?;
    writer.write_chroms(&reference)?;

    let selectors: Vec<Option<String>> = match input.flavor() {
        CoolerFlavor::Cool => vec![None],
        CoolerFlavor::Mcool => input.resolutions()?.into_iter().map(|r| Some(r.to_string())).collect(),
        CoolerFlavor::Scool => input.cells()?.into_iter().map(Some).collect(),
    };

    let mut reports = Vec::new();
    for selector in selectors {
        let group = input.group_reader(selector.as_deref())?;
        let bin_size = group.bin_size()?;
        let group_reference = input.reference(selector.as_deref())?;
        let bins = if bin_size > 0 {
            BinTable::build_fixed(group_reference, bin_size as u64)?
        } else {
            crate::file::build_variable_from_reader(&group, group_reference)?
        };

        let (bin1, bin2, counts) = group.read_pixels()?;
        let pixels: Vec<Pixel> = bin1
            .into_iter()
            .zip(bin2)
            .zip(counts)
            .map(|((b1, b2), count)| Pixel { bin1_id: b1 as u64, bin2_id: b2 as u64, count })
            .collect();

        let was_broken = !index_is_monotonic(&group.read_bin_offsets()?.to_vec());
        if was_broken {
            warn!("resolution/cell {selector:?}: bin1_offset is not monotonic, rebuilding");
        } else {
            info!("resolution/cell {selector:?}: index already healthy, rewriting unchanged");
        }

        let prefix = match (input.flavor(), &selector) {
            (CoolerFlavor::Cool, _) => String::new(),
            (CoolerFlavor::Mcool, Some(r)) => format!("resolutions/{r}"),
            (CoolerFlavor::Scool, Some(c)) => format!("cells/{c}"),
            _ => String::new(),
        };
        writer.write_resolution(&prefix, &bins, bin_size, &pixels)?;

        let resolution = if bin_size > 0 { Some(bin_size) } else { None };
        reports.push(FixReport { resolution, was_broken });
    }

    Ok(reports)
}

fn index_is_monotonic(offsets: &[u64]) -> bool {
    offsets.windows(2).all(|w| w[0] <= w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_index_passes() {
        assert!(index_is_monotonic(&[0, 0, 3, 5, 5, 9]));
    }

    #[test]
    fn non_monotonic_index_fails() {
        assert!(!index_is_monotonic(&[0, 3, 2, 5]));
    }
}
