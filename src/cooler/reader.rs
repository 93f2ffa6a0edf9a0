use std::path::{Path, PathBuf};

use ndarray::{s, Array1};
use hdf5::types::VarLenAscii;

use super::CoolerFlavor;
use crate::error::{HictkError, Result};
use crate::reference::Reference;

/// Thin wrapper owning the HDF5 file handle, grounded on the teacher's
/// `MatrixReader` (hic-matrix/src/reader.rs).
#[derive(Debug)]
pub struct CoolerReader {
    file: hdf5::File,
    path: PathBuf,
}

impl CoolerReader {
    pub fn open(path: &Path) -> Result<CoolerReader> {
        let file = hdf5::File::open(path).map_err(|_| HictkError::BadFileFormat {
            path: path.to_path_buf(),
        })?;
        Ok(CoolerReader { file, path: path.to_path_buf() })
    }

    pub fn detect_flavor(&self) -> Result<CoolerFlavor> {
        if self.file.group("resolutions").is_ok() {
            Ok(CoolerFlavor::Mcool)
        } else if self.file.group("cells").is_ok() {
            Ok(CoolerFlavor::Scool)
        } else if self.file.group("chroms").is_ok() && self.file.group("bins").is_ok() {
            Ok(CoolerFlavor::Cool)
        } else {
            Err(HictkError::BadFileFormat { path: self.path.clone() })
        }
    }

    pub fn list_resolutions(&self) -> Result<Vec<u32>> {
        let grp = self.file.group("resolutions")?;
        let mut resolutions: Vec<u32> = grp
            .member_names()?
            .into_iter()
            .filter_map(|s| s.parse::<u32>().ok())
            .collect();
        resolutions.sort_unstable();
        Ok(resolutions)
    }

    pub fn list_cells(&self) -> Result<Vec<String>> {
        let grp = self.file.group("cells")?;
        Ok(grp.member_names()?)
    }

    /// Reads the Reference from `<prefix>/chroms`. For `.mcool`/`.scool`
    /// the chrom table is shared and usually lives at the container
    /// root rather than under the per-group prefix; fall back there.
    pub fn read_reference(&self, group: Option<&str>) -> Result<Reference> {
        let grp = match group {
            Some(path) if !path.is_empty() => self
                .file
                .group(&format!("{path}/chroms"))
                .or_else(|_| self.file.group("chroms"))?,
            _ => self.file.group("chroms")?,
        };
        let names = read_dataset::<VarLenAscii>(&grp, "name")?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let lengths = read_dataset::<u64>(&grp, "length")?.to_vec();
        Reference::new(names, lengths)
    }

    pub fn group_reader(&self, prefix: &str) -> Result<GroupReader> {
        let root = if prefix.is_empty() {
            self.file.group("/")?
        } else {
            self.file.group(prefix)?
        };
        Ok(GroupReader { root })
    }

    pub fn file(&self) -> &hdf5::File {
        &self.file
    }
}

/// Reader bound to one resolution/cell group (`chroms` may live at the
/// container root; `bins`/`pixels`/`indexes` live here). Mirrors the
/// teacher's `ResGrpReader`.
#[derive(Debug)]
pub struct GroupReader {
    root: hdf5::Group,
}

impl GroupReader {
    pub fn root(&self) -> &hdf5::Group {
        &self.root
    }

    pub fn bin_size(&self) -> Result<u32> {
        if let Ok(attr) = self.root.attr("bin-size") {
            return Ok(attr.read_scalar::<i64>()? as u32);
        }
        // variable-width bin tables don't carry a bin-size attribute;
        // fall back to the width of the first bin.
        let starts = self.read_bin_table_starts()?;
        let ends = self.read_bin_table_ends()?;
        Ok((ends[0] - starts[0]) as u32)
    }

    pub fn n_bins(&self) -> Result<usize> {
        Ok(self.root.group("bins")?.dataset("chrom")?.size())
    }

    pub fn n_pixels(&self) -> Result<usize> {
        Ok(self.root.group("pixels")?.dataset("bin1_id")?.size())
    }

    pub fn weight_names(&self) -> Result<Vec<String>> {
        const RESERVED: &[&str] = &["chrom", "start", "end"];
        Ok(self
            .root
            .group("bins")?
            .member_names()?
            .into_iter()
            .filter(|n| !RESERVED.contains(&n.as_str()))
            .collect())
    }

    pub fn read_chrom_offsets(&self) -> Result<Array1<u64>> {
        Ok(read_dataset::<u64>(&self.root.group("indexes")?, "chrom_offset")?)
    }

    pub fn read_bin_offsets(&self) -> Result<Array1<u64>> {
        Ok(read_dataset::<u64>(&self.root.group("indexes")?, "bin1_offset")?)
    }

    pub fn read_bin_table_chr_ids(&self) -> Result<Array1<u32>> {
        Ok(read_dataset::<u32>(&self.root.group("bins")?, "chrom")?)
    }

    pub fn read_bin_table_starts(&self) -> Result<Array1<u64>> {
        Ok(read_dataset::<u64>(&self.root.group("bins")?, "start")?)
    }

    pub fn read_bin_table_ends(&self) -> Result<Array1<u64>> {
        Ok(read_dataset::<u64>(&self.root.group("bins")?, "end")?)
    }

    pub fn read_weights(&self, name: &str) -> Result<Array1<f64>> {
        read_dataset::<f64>(&self.root.group("bins")?, name).map_err(|_| {
            HictkError::UnknownNormalization { name: name.to_string(), resolution: 0 }
        })
    }

    pub fn read_pixel_chunk(
        &self,
        start: usize,
        end: usize,
    ) -> Result<(Array1<u32>, Array1<u32>, Array1<f64>)> {
        let grp = self.root.group("pixels")?;
        let bin1 = read_dataset_slice::<u32>(&grp, "bin1_id", start, end)?;
        let bin2 = read_dataset_slice::<u32>(&grp, "bin2_id", start, end)?;
        // count dtype is int32 (raw) or float64 (balanced/aggregated);
        // widen raw counts losslessly to f64 for the unified pixel type.
        let dataset = grp.dataset("count")?;
        let count = if dataset.dtype()?.is::<f64>() {
            read_dataset_slice::<f64>(&grp, "count", start, end)?
        } else {
            read_dataset_slice::<u32>(&grp, "count", start, end)?.mapv(|x| x as f64)
        };
        Ok((bin1, bin2, count))
    }

    pub fn read_pixels(&self) -> Result<(Array1<u32>, Array1<u32>, Array1<f64>)> {
        self.read_pixel_chunk(0, self.n_pixels()?)
    }
}

pub fn read_dataset_slice<T: hdf5::H5Type>(
    grp: &hdf5::Group,
    name: &str,
    start: usize,
    end: usize,
) -> Result<Array1<T>> {
    let dts = grp.dataset(name)?;
    Ok(dts.read_slice_1d(s![start..end])?)
}

pub fn read_dataset<T: hdf5::H5Type>(grp: &hdf5::Group, name: &str) -> Result<Array1<T>> {
    let dts = grp.dataset(name)?;
    Ok(dts.read_1d::<T>()?)
}
