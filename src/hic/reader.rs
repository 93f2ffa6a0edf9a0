use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use byteorder::{LittleEndian, ReadBytesExt};

use super::block::{self, BlockRecord};
use super::header::{read_cstring, HicHeader};
use crate::error::{HictkError, Result};
use crate::reference::Reference;

#[derive(Debug, Clone, Copy)]
pub struct IndexEntry {
    pub position: i64,
    pub size: i64,
}

/// The flat `(key, position, size)` table at `master_index_offset`,
/// grounded on `straw::HicFile::get_matrix_zoom_data`'s inline master-index
/// scan (xuzhougeng-hic_resolution_rs/src/straw.rs), generalized into a
/// reusable map so both matrix pointers and normalization-vector pointers
/// share one reader.
#[derive(Debug, Clone)]
pub struct MasterIndex {
    entries: AHashMap<String, IndexEntry>,
}

impl MasterIndex {
    pub fn read(r: &mut (impl Read + Seek), header: &HicHeader) -> Result<MasterIndex> {
        header.seek_to_master(r)?;
        let n_entries = r.read_i32::<LittleEndian>()?;
        let mut entries = AHashMap::with_capacity(n_entries.max(0) as usize);
        for _ in 0..n_entries {
            let key = read_cstring(r)?;
            let position = r.read_i64::<LittleEndian>()?;
            let size = r.read_i32::<LittleEndian>()? as i64;
            entries.insert(key, IndexEntry { position, size });
        }
        Ok(MasterIndex { entries })
    }

    pub fn get(&self, key: &str) -> Option<IndexEntry> {
        self.entries.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

pub fn matrix_key(chrom1_rank: u32, chrom2_rank: u32) -> String {
    let (c1, c2) = if chrom1_rank <= chrom2_rank {
        (chrom1_rank, chrom2_rank)
    } else {
        (chrom2_rank, chrom1_rank)
    };
    format!("{c1}_{c2}")
}

/// One `(unit, resolution)` zoom level's block index for a chromosome pair
/// (spec §4.4.2), grounded on `straw::read_matrix`/`read_matrix_zoom_data`.
#[derive(Debug, Clone)]
pub struct MatrixZoomData {
    pub resolution: u32,
    pub block_bin_count: i32,
    pub block_col_count: i32,
    pub block_map: BTreeMap<i32, IndexEntry>,
}

/// An open `.hic` container: header plus master index, re-opening the
/// underlying file handle per read (blocks are scattered, so we don't hold
/// a single cursor position across calls — mirrors the teacher-adjacent
/// straw reader re-opening `hic.path` in `read_block`).
#[derive(Debug)]
pub struct HicFile {
    path: PathBuf,
    header: HicHeader,
    master: MasterIndex,
}

impl HicFile {
    pub fn open(path: &Path) -> Result<HicFile> {
        let file = File::open(path).map_err(HictkError::Io)?;
        let mut r = BufReader::new(file);
        let header = HicHeader::read(&mut r).map_err(|_| HictkError::BadFileFormat {
            path: path.to_path_buf(),
        })?;
        let master = MasterIndex::read(&mut r, &header)?;
        Ok(HicFile { path: path.to_path_buf(), header, master })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> i32 {
        self.header.version
    }

    pub fn reference(&self) -> &Reference {
        &self.header.reference
    }

    pub fn bp_resolutions(&self) -> &[u32] {
        &self.header.bp_resolutions
    }

    /// Distinct normalization method names with at least one vector at
    /// `resolution`, read off the master index key convention used by
    /// `read_norm_vector` (`"{method}_{chrom}_BP_{resolution}"`).
    pub fn norm_methods(&self, resolution: u32) -> Vec<String> {
        let suffix = format!("_BP_{resolution}");
        let mut methods: Vec<String> = self
            .master
            .keys()
            .filter_map(|k| {
                let rest = k.strip_suffix(&suffix)?;
                let (method, _chrom) = rest.rsplit_once('_')?;
                Some(method.to_string())
            })
            .collect();
        methods.sort();
        methods.dedup();
        methods
    }

    /// Reads one `(chrom1, chrom2, "BP", resolution)` zoom level's block
    /// index. Returns `Ok(None)` when the chromosome pair has no matrix
    /// record (e.g. never observed together) or the resolution isn't
    /// present among its zoom levels.
    pub fn matrix_zoom_data(
        &self,
        chrom1_rank: u32,
        chrom2_rank: u32,
        resolution: u32,
    ) -> Result<Option<MatrixZoomData>> {
        let key = matrix_key(chrom1_rank, chrom2_rank);
        let entry = match self.master.get(&key) {
            Some(e) => e,
            None => return Ok(None),
        };

        let file = File::open(&self.path)?;
        let mut r = BufReader::new(file);
        r.seek(SeekFrom::Start(entry.position as u64))?;
        let _c1 = r.read_i32::<LittleEndian>()?;
        let _c2 = r.read_i32::<LittleEndian>()?;
        let n_zoom_levels = r.read_i32::<LittleEndian>()?;

        for _ in 0..n_zoom_levels {
            let unit = read_cstring(&mut r)?;
            let _old_zoom_index = r.read_i32::<LittleEndian>()?;
            let _sum_counts = r.read_f32::<LittleEndian>()?;
            let _occupied_cell_count = r.read_f32::<LittleEndian>()?;
            let _std_dev = r.read_f32::<LittleEndian>()?;
            let _percent95 = r.read_f32::<LittleEndian>()?;
            let bin_size = r.read_i32::<LittleEndian>()? as u32;
            let block_bin_count = r.read_i32::<LittleEndian>()?;
            let block_col_count = r.read_i32::<LittleEndian>()?;
            let n_blocks = r.read_i32::<LittleEndian>()?;

            let is_match = unit == "BP" && bin_size == resolution;
            if !is_match {
                r.seek(SeekFrom::Current(n_blocks as i64 * (4 + 8 + 4)))?;
                continue;
            }

            let mut block_map = BTreeMap::new();
            for _ in 0..n_blocks {
                let block_number = r.read_i32::<LittleEndian>()?;
                let position = r.read_i64::<LittleEndian>()?;
                let size = r.read_i32::<LittleEndian>()? as i64;
                block_map.insert(block_number, IndexEntry { position, size });
            }
            return Ok(Some(MatrixZoomData { resolution, block_bin_count, block_col_count, block_map }));
        }

        Ok(None)
    }

    pub fn read_block(&self, entry: &IndexEntry) -> Result<Vec<BlockRecord>> {
        if entry.size <= 0 {
            return Ok(Vec::new());
        }
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(entry.position as u64))?;
        let mut compressed = vec![0u8; entry.size as usize];
        file.read_exact(&mut compressed)?;
        let body = block::decompress(&compressed)?;
        block::decode(&body, self.header.version)
    }

    /// Reads a `(method, chrom, "BP", resolution)` normalization vector
    /// (spec §4.4.5). Master-index keys for normalization vectors follow
    /// the same flat `(key, position, size)` table as matrix pointers;
    /// the body is a length-prefixed float64 array aligned to that
    /// chromosome's bins at the given resolution.
    pub fn read_norm_vector(
        &self,
        method: &str,
        chrom_rank: u32,
        resolution: u32,
    ) -> Result<Option<Vec<f64>>> {
        let key = format!("{method}_{chrom_rank}_BP_{resolution}");
        let entry = match self.master.get(&key) {
            Some(e) => e,
            None => return Ok(None),
        };
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(entry.position as u64))?;
        let n = file.read_i32::<LittleEndian>()? as usize;
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(file.read_f64::<LittleEndian>()?);
        }
        Ok(Some(values))
    }
}
