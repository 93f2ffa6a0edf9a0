//! Hic back-end (spec §4.4): monolithic binary layout with magic header,
//! master index, per-(chrom1,chrom2,unit,binSize) block trees, and
//! LZ4/DEFLATE-compressed block decode. Grounded on the from-scratch
//! `.hic` reader at xuzhougeng-hic_resolution_rs/src/straw.rs, since the
//! teacher repo has no monolithic binary back-end of its own.

pub mod block;
pub mod header;
pub mod reader;
pub mod selector;
pub mod writer;

use std::path::{Path, PathBuf};

pub use reader::HicFile as HicReader;
pub use selector::HicSelector;
pub use writer::HicWriter;

use crate::bintable::BinTable;
use crate::error::Result;
use crate::pixels::Pixel;
use crate::reference::Reference;

/// An open `.hic` container, mirroring `CoolerFile`'s surface so `file.rs`
/// can dispatch to either back-end behind one tagged-variant type.
pub struct HicFile {
    path: PathBuf,
    reader: reader::HicFile,
}

impl HicFile {
    pub fn open(path: &Path) -> Result<HicFile> {
        let reader = reader::HicFile::open(path)?;
        Ok(HicFile { path: path.to_path_buf(), reader })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reference(&self) -> &Reference {
        self.reader.reference()
    }

    pub fn resolutions(&self) -> Vec<u32> {
        let mut r = self.reader.bp_resolutions().to_vec();
        r.sort_unstable();
        r
    }

    pub fn bin_table(&self, resolution: u32) -> Result<BinTable> {
        BinTable::build_fixed(self.reference().clone(), resolution as u64)
    }

    pub fn selector(&self) -> HicSelector<'_> {
        HicSelector::new(&self.reader)
    }

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
        self.selector().fetch(bins, resolution, chrom1_rank, chrom2_rank, lo1, hi1, lo2, hi2)
    }

    pub fn norm_methods(&self, resolution: u32) -> Vec<String> {
        self.reader.norm_methods(resolution)
    }

    pub fn read_norm_vector(
        &self,
        method: &str,
        chrom_rank: u32,
        resolution: u32,
    ) -> Result<Option<Vec<f64>>> {
        self.reader.read_norm_vector(method, chrom_rank, resolution)
    }
}
