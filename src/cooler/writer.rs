use std::path::Path;

use hdf5::types::VarLenAscii;
use ndarray::{Array1, ArrayView1};

use crate::bintable::BinTable;
use crate::error::Result;
use crate::pixels::Pixel;
use crate::reference::Reference;

/// Dataset-level compression, applied uniformly to every variable-length
/// dataset this writer creates. Mirrors spec §4.3's note that Cooler
/// containers are usually gzip-compressed; zstd is offered as the faster
/// alternative the teacher's own zoom builder leaves room for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip(u8),
    Zstd(u8),
}

impl Default for Compression {
    fn default() -> Compression {
        Compression::Gzip(6)
    }
}

/// Writes a single resolution/cell group plus (on first use) the shared
/// `chroms` table, generalizing the teacher's `MatrixWriter`/`ResGrpWriter`
/// pair (hic-matrix/src/writer.rs) to arbitrary group prefixes so the same
/// code serves plain `.cool`, `.mcool` resolutions and `.scool` cells.
pub struct CoolerWriter {
    file: hdf5::File,
    compression: Compression,
}

impl CoolerWriter {
    pub fn create(path: &Path, compression: Compression) -> Result<CoolerWriter> {
        Ok(CoolerWriter { file: hdf5::File::create(path)?, compression })
    }

    pub fn open_rw(path: &Path, compression: Compression) -> Result<CoolerWriter> {
        Ok(CoolerWriter { file: hdf5::File::open_rw(path)?, compression })
    }

    pub fn file(&self) -> &hdf5::File {
        &self.file
    }

    /// Writes the shared `chroms` table at the container root. Safe to
    /// call once per container; `.mcool`/`.scool` groups share this table.
    pub fn write_chroms(&self, reference: &Reference) -> Result<()> {
        if self.file.group("chroms").is_ok() {
            return Ok(());
        }
        let grp = self.file.create_group("chroms")?;
        let names: Array1<VarLenAscii> = reference
            .names()
            .iter()
            .map(|n| VarLenAscii::from_ascii(n.as_bytes()).unwrap())
            .collect();
        let lengths: Array1<u64> = reference.lengths().iter().copied().collect();
        self.write_dataset(&grp, "name", names.view())?;
        self.write_dataset(&grp, "length", lengths.view())?;
        Ok(())
    }

    /// Creates `<prefix>/bins|pixels|indexes` and writes every dataset in
    /// one shot from fully-materialized columns. Used by `coarsen`/`merge`/
    /// `ingest`, where the full pixel set for one resolution is already
    /// resident in memory by the time it's handed to the writer.
    pub fn write_resolution(
        &self,
        prefix: &str,
        bins: &BinTable,
        bin_size: u32,
        pixels: &[Pixel],
    ) -> Result<()> {
        let grp = if prefix.is_empty() {
            self.file.group("/")?
        } else {
            self.file.create_group(prefix)?
        };

        self.write_bins(&grp, bins, bin_size)?;
        self.write_pixels_and_index(&grp, bins, pixels)?;
        Ok(())
    }

    pub fn write_bins(&self, grp: &hdf5::Group, bins: &BinTable, bin_size: u32) -> Result<()> {
        let bins_grp = grp.create_group("bins")?;
        let (chroms, starts, ends) = bins.to_columns();
        let chroms = Array1::from_vec(chroms);
        let starts = Array1::from_vec(starts);
        let ends = Array1::from_vec(ends);
        self.write_dataset(&bins_grp, "chrom", chroms.view())?;
        self.write_dataset(&bins_grp, "start", starts.view())?;
        self.write_dataset(&bins_grp, "end", ends.view())?;
        if bin_size > 0 {
            bins_grp.new_attr::<i64>().create("bin-size")?.write_scalar(&(bin_size as i64))?;
        }
        Ok(())
    }

    /// Pixels must already be sorted by `(bin1_id, bin2_id)`; builds the
    /// `indexes/{chrom_offset,bin1_offset}` index datasets by the same
    /// running-scan method as the teacher's `build_bin_offsets_from_pixels`.
    pub fn write_pixels_and_index(
        &self,
        grp: &hdf5::Group,
        bins: &BinTable,
        pixels: &[Pixel],
    ) -> Result<()> {
        let n_bins = bins.len();

        let mut bin1_ids = Array1::<u32>::default(pixels.len());
        let mut bin2_ids = Array1::<u32>::default(pixels.len());
        let mut counts = Array1::<f64>::default(pixels.len());
        for (i, px) in pixels.iter().enumerate() {
            bin1_ids[i] = px.bin1_id as u32;
            bin2_ids[i] = px.bin2_id as u32;
            counts[i] = px.count;
        }

        let pixels_grp = grp.create_group("pixels")?;
        self.write_dataset(&pixels_grp, "bin1_id", bin1_ids.view())?;
        self.write_dataset(&pixels_grp, "bin2_id", bin2_ids.view())?;
        self.write_dataset(&pixels_grp, "count", counts.view())?;

        let mut bin1_offset = Array1::<u64>::default(n_bins + 1);
        let mut cursor = 0usize;
        for bin in 0..n_bins {
            while cursor < pixels.len() && (pixels[cursor].bin1_id as usize) < bin {
                cursor += 1;
            }
            bin1_offset[bin] = cursor as u64;
        }
        bin1_offset[n_bins] = pixels.len() as u64;

        let mut chrom_offset = Array1::<u64>::default(bins.reference().len() + 1);
        for chrom_rank in 0..bins.reference().len() {
            let (lo, _) = bins.chrom_bin_range(chrom_rank as u32)?;
            chrom_offset[chrom_rank] = lo as u64;
        }
        chrom_offset[bins.reference().len()] = n_bins as u64;

        let indexes_grp = grp.create_group("indexes")?;
        self.write_dataset(&indexes_grp, "bin1_offset", bin1_offset.view())?;
        self.write_dataset(&indexes_grp, "chrom_offset", chrom_offset.view())?;

        Ok(())
    }

    /// Appends/overwrites a named balancing-weight column under
    /// `<prefix>/bins`, mirroring the teacher's `write_balancing_weights`.
    pub fn write_weights(&self, prefix: &str, name: &str, weights: ArrayView1<f64>) -> Result<()> {
        let grp = if prefix.is_empty() {
            self.file.group("/")?
        } else {
            self.file.group(prefix)?
        }
        .group("bins")?;

        match grp.dataset(name) {
            Ok(dts) => {
                dts.resize(weights.len())?;
                dts.write(weights)?;
            }
            Err(_) => self.write_dataset(&grp, name, weights)?,
        }
        Ok(())
    }

    fn write_dataset<Q: hdf5::H5Type>(
        &self,
        grp: &hdf5::Group,
        name: &str,
        data: ArrayView1<Q>,
    ) -> Result<()> {
        let builder = grp.new_dataset::<Q>();
        let dts = match self.compression {
            Compression::None => builder.create(name, data.len())?,
            Compression::Gzip(level) => {
                builder.deflate(level).chunk(chunk_size(data.len())).create(name, data.len())?
            }
            Compression::Zstd(level) => {
                // hdf5-rust has no native zstd filter; fall back to the
                // HDF5 dynamic filter id registered by the `hdf5-plugin`
                // ecosystem convention (32015), matching what cooler/hictk
                // C++ write when asked for zstd-compressed output.
                builder
                    .filter(32015, Some(&[level as u32]))
                    .chunk(chunk_size(data.len()))
                    .create(name, data.len())?
            }
        };
        dts.write(data)?;
        Ok(())
    }
}

fn chunk_size(len: usize) -> usize {
    len.clamp(1, 1 << 16)
}
