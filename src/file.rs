use std::path::Path;

use ndarray::Array1;

use crate::bintable::BinTable;
use crate::cooler::{CoolerFile, CoolerFlavor, CoolerSelector};
use crate::error::{HictkError, Result};
use crate::hic::HicFile;
use crate::pixels::Pixel;
use crate::query::PairRect;
use crate::reference::Reference;
use crate::uri::Uri;

/// Unified file handle over the two back-end families (spec §3 "File
/// handle", §9 "dynamic polymorphism" design note): a tagged variant of
/// back-end types behind one front-end type, so callers never branch on
/// format except at `open`.
pub enum File {
    Cooler(CoolerFile),
    Hic(HicFile),
}

impl File {
    /// Dispatches on the container's magic bytes (HDF5 signature vs.
    /// `HIC\0`) rather than the file extension, so a renamed file still
    /// opens correctly.
    pub fn open(uri: &Uri) -> Result<File> {
        let path = uri.path();
        if is_hdf5(path)? {
            Ok(File::Cooler(CoolerFile::open(path)?))
        } else if is_hic(path)? {
            Ok(File::Hic(HicFile::open(path)?))
        } else {
            Err(HictkError::BadFileFormat { path: path.to_path_buf() })
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            File::Cooler(f) => f.path(),
            File::Hic(f) => f.path(),
        }
    }

    pub fn reference(&self, group: Option<&str>) -> Result<Reference> {
        match self {
            File::Cooler(f) => f.reference(group),
            File::Hic(f) => Ok(f.reference().clone()),
        }
    }

    pub fn resolutions(&self) -> Result<Vec<u32>> {
        match self {
            File::Cooler(f) => f.resolutions(),
            File::Hic(f) => Ok(f.resolutions()),
        }
    }

    pub fn cells(&self) -> Result<Vec<String>> {
        match self {
            File::Cooler(f) => f.cells(),
            File::Hic(_) => Ok(Vec::new()),
        }
    }

    /// `.cool` forbids a resolution argument (it has exactly one);
    /// `.mcool`/`.hic`/`.scool` require one (cell name doubles as the
    /// "resolution" selector for `.scool`).
    pub fn requires_resolution(&self) -> bool {
        !matches!(self, File::Cooler(f) if f.flavor() == CoolerFlavor::Cool)
    }

    pub fn bin_table(&self, resolution: Option<u32>, cell: Option<&str>) -> Result<BinTable> {
        match self {
            File::Cooler(f) => {
                let selector = match f.flavor() {
                    CoolerFlavor::Cool => None,
                    CoolerFlavor::Mcool => {
                        Some(resolution.ok_or_else(require_resolution)?.to_string())
                    }
                    CoolerFlavor::Scool => Some(cell.ok_or_else(require_cell)?.to_string()),
                };
                let grp = f.group_reader(selector.as_deref())?;
                let reference = f.reference(selector.as_deref())?;
                let bin_size = grp.bin_size()?;
                if bin_size > 0 {
                    BinTable::build_fixed(reference, bin_size as u64)
                } else {
                    build_variable_from_reader(&grp, reference)
                }
            }
            File::Hic(f) => {
                let resolution = resolution.ok_or_else(require_resolution)?;
                f.bin_table(resolution)
            }
        }
    }

    pub fn weight_names(&self, resolution: Option<u32>) -> Result<Vec<String>> {
        match self {
            File::Cooler(f) => {
                let selector = self.cooler_group_selector(f, resolution)?;
                f.group_reader(selector.as_deref())?.weight_names()
            }
            File::Hic(f) => {
                let resolution = resolution.ok_or_else(require_resolution)?;
                Ok(f.norm_methods(resolution))
            }
        }
    }

    pub fn read_weights(&self, resolution: Option<u32>, name: &str) -> Result<Array1<f64>> {
        match self {
            File::Cooler(f) => {
                let selector = self.cooler_group_selector(f, resolution)?;
                f.group_reader(selector.as_deref())?.read_weights(name)
            }
            File::Hic(f) => {
                let resolution = resolution.ok_or_else(require_resolution)?;
                let bins = f.bin_table(resolution)?;
                let mut out = vec![f64::NAN; bins.len()];
                for chrom_rank in 0..f.reference().len() as u32 {
                    let (lo, hi) = bins.chrom_bin_range(chrom_rank)?;
                    if let Some(values) = f.read_norm_vector(name, chrom_rank, resolution)? {
                        for (i, v) in values.into_iter().enumerate() {
                            if (lo as usize + i) < hi as usize {
                                out[lo as usize + i] = v;
                            }
                        }
                    } else {
                        return Err(HictkError::UnknownNormalization {
                            name: name.to_string(),
                            resolution,
                        });
                    }
                }
                Ok(Array1::from_vec(out))
            }
        }
    }

    /// Fetches every pixel in one chromosome-pair rectangle in the global
    /// bin-id space, dispatching to the matching back-end selector (spec
    /// §4.5/§4.6). `rect` is `(chrom1_rank, chrom2_rank, bin1_lo, bin1_hi,
    /// bin2_lo, bin2_hi)`.
    pub fn fetch_rect(
        &self,
        bins: &BinTable,
        resolution: Option<u32>,
        cell: Option<&str>,
        rect: PairRect,
    ) -> Result<Vec<Pixel>> {
        let (_, _, lo1, hi1, lo2, hi2) = rect;
        match self {
            File::Cooler(f) => {
                let selector = match f.flavor() {
                    CoolerFlavor::Cool => None,
                    CoolerFlavor::Mcool => Some(resolution.ok_or_else(require_resolution)?.to_string()),
                    CoolerFlavor::Scool => Some(cell.ok_or_else(require_cell)?.to_string()),
                };
                let reader = f.group_reader(selector.as_deref())?;
                let sel = CoolerSelector::new(&reader)?;
                let (bin1, bin2, counts) =
                    sel.fetch(&reader, lo1 as usize, hi1 as usize, lo2 as usize, hi2 as usize)?;
                Ok(bin1
                    .into_iter()
                    .zip(bin2)
                    .zip(counts)
                    .map(|((b1, b2), count)| Pixel { bin1_id: b1, bin2_id: b2, count })
                    .collect())
            }
            File::Hic(f) => {
                let resolution = resolution.ok_or_else(require_resolution)?;
                f.fetch(bins, resolution, rect.0, rect.1, lo1, hi1, lo2, hi2)
            }
        }
    }

    fn cooler_group_selector(&self, f: &CoolerFile, resolution: Option<u32>) -> Result<Option<String>> {
        Ok(match f.flavor() {
            CoolerFlavor::Cool => None,
            CoolerFlavor::Mcool => Some(resolution.ok_or_else(require_resolution)?.to_string()),
            CoolerFlavor::Scool => {
                return Err(HictkError::ConflictingQueryOptions {
                    reason: "weight lookup on .scool requires a cell selector".into(),
                })
            }
        })
    }
}

fn require_resolution() -> HictkError {
    HictkError::ConflictingQueryOptions { reason: "a resolution is required for this file".into() }
}

fn require_cell() -> HictkError {
    HictkError::ConflictingQueryOptions { reason: "a cell name is required for this .scool".into() }
}

pub(crate) fn build_variable_from_reader(
    grp: &crate::cooler::GroupReader,
    reference: Reference,
) -> Result<BinTable> {
    let chr = grp.read_bin_table_chr_ids()?;
    let starts = grp.read_bin_table_starts()?;
    let ends = grp.read_bin_table_ends()?;
    let triples = chr
        .iter()
        .zip(starts.iter())
        .zip(ends.iter())
        .map(|((&c, &s), &e)| (c, s, e))
        .collect();
    BinTable::build_variable(reference, triples)
}

fn is_hdf5(path: &Path) -> Result<bool> {
    let mut f = std::fs::File::open(path)?;
    let mut magic = [0u8; 8];
    use std::io::Read;
    if f.read_exact(&mut magic).is_err() {
        return Ok(false);
    }
    Ok(magic == [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'])
}

fn is_hic(path: &Path) -> Result<bool> {
    let mut f = std::fs::File::open(path)?;
    let mut magic = [0u8; 4];
    use std::io::Read;
    if f.read_exact(&mut magic).is_err() {
        return Ok(false);
    }
    Ok(&magic[..3] == crate::hic::header::MAGIC && magic[3] == 0)
}
