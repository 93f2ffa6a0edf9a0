//! Writer / Ingest pipeline (spec §4.9): buffer, sort & coalesce, spill to
//! compressed temp files, N-way merge, finalize into a Cooler or Hic
//! container. Drives `load` (text records → matrix) and `merge` (N
//! matrices → 1).
//!
//! The chunked spill-and-merge shape is grounded on
//! `manish59-grit`'s `streaming_multiinter` (min-heap over per-source
//! readers, reversed `Ord` to turn `BinaryHeap` into a min-heap); the
//! external-sort-by-chunks idea itself mirrors the teacher's own
//! `hic-convertor::sort::sort_pairs`, generalized here to an in-process
//! merge instead of shelling out to `sort(1)` since the unit being sorted
//! is a typed pixel, not a text line.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File as StdFile;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use tempfile::TempDir;

use crate::bintable::BinTable;
use crate::cooler::writer::Compression as CoolerCompression;
use crate::cooler::CoolerWriter;
use crate::error::Result;
use crate::hic::HicWriter;
use crate::pixels::Pixel;
use crate::reference::Reference;

/// Record/count width on disk: whether a count column round-trips through
/// an integer or stays a float end to end (spec §4.9 `count_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountType {
    Int,
    Float,
}

/// Compression applied to spill files (spec §4.9 `compression: {algo,
/// level}`), independent of the final container's own compression.
#[derive(Debug, Clone, Copy)]
pub enum SpillCompression {
    None,
    Gzip(u8),
    Zstd(i32),
}

impl Default for SpillCompression {
    fn default() -> SpillCompression {
        SpillCompression::Zstd(3)
    }
}

/// Tunables for one ingest/merge run (spec §4.9's configurable options).
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub compression: SpillCompression,
    pub threads: usize,
    pub tmpdir: Option<PathBuf>,
    pub count_type: CountType,
}

impl Default for IngestConfig {
    fn default() -> IngestConfig {
        IngestConfig {
            chunk_size: 1 << 20,
            compression: SpillCompression::default(),
            threads: 1,
            tmpdir: None,
            count_type: CountType::Float,
        }
    }
}

/// Accumulates an unsorted pixel stream, spilling sorted-and-coalesced
/// chunks to disk, and produces one fully sorted/coalesced pixel sequence
/// on `finish()` (spec §4.9 steps 1-4). Spill files live under a
/// `TempDir` owned by this type and are removed the moment it drops,
/// whether `finish()` ran to completion or the pipeline aborted early.
pub struct PixelSpiller {
    cfg: IngestConfig,
    buffer: Vec<Pixel>,
    spills: Vec<PathBuf>,
    tmpdir: TempDir,
}

impl PixelSpiller {
    pub fn new(cfg: IngestConfig) -> Result<PixelSpiller> {
        let tmpdir = match &cfg.tmpdir {
            Some(dir) => tempfile::Builder::new().prefix("hictk-ingest-").tempdir_in(dir)?,
            None => tempfile::Builder::new().prefix("hictk-ingest-").tempdir()?,
        };
        Ok(PixelSpiller { buffer: Vec::with_capacity(cfg.chunk_size.min(1 << 20)), cfg, spills: Vec::new(), tmpdir })
    }

    pub fn push(&mut self, pixel: Pixel) -> Result<()> {
        self.buffer.push(pixel);
        if self.buffer.len() >= self.cfg.chunk_size {
            self.spill()?;
        }
        Ok(())
    }

    pub fn extend(&mut self, pixels: impl IntoIterator<Item = Pixel>) -> Result<()> {
        for px in pixels {
            self.push(px)?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        sort_and_coalesce(&mut self.buffer);

        let path = self.tmpdir.path().join(format!("chunk-{:06}.bin", self.spills.len()));
        write_spill(&path, &self.buffer, self.cfg.compression)?;
        debug!("spilled {} pixels to {}", self.buffer.len(), path.display());
        self.spills.push(path);
        self.buffer.clear();
        Ok(())
    }

    /// Drains every pending pixel, merges all spills (plus whatever is
    /// still resident) with a min-heap keyed on `(bin1_id, bin2_id)`, and
    /// returns the fully sorted, deduplicated result.
    pub fn finish(mut self) -> Result<Vec<Pixel>> {
        if self.spills.is_empty() {
            sort_and_coalesce(&mut self.buffer);
            info!("ingest: {} pixels, no spill required", self.buffer.len());
            return Ok(self.buffer);
        }

        if !self.buffer.is_empty() {
            self.spill()?;
        }

        info!("merging {} spill chunks", self.spills.len());
        let mut sources: Vec<SpillReader> =
            self.spills.iter().map(|p| SpillReader::open(p, self.cfg.compression)).collect::<Result<_>>()?;

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(sources.len());
        for (idx, src) in sources.iter_mut().enumerate() {
            if let Some(px) = src.next_pixel()? {
                heap.push(HeapEntry { bin1_id: px.bin1_id, bin2_id: px.bin2_id, count: px.count, source: idx });
            }
        }

        let mut merged = Vec::new();
        while let Some(top) = heap.pop() {
            let mut count = top.count;
            // coalesce every entry sharing this key before advancing any source.
            while let Some(next) = heap.peek() {
                if next.bin1_id == top.bin1_id && next.bin2_id == top.bin2_id {
                    let next = heap.pop().unwrap();
                    count += next.count;
                    if let Some(px) = sources[next.source].next_pixel()? {
                        heap.push(HeapEntry { bin1_id: px.bin1_id, bin2_id: px.bin2_id, count: px.count, source: next.source });
                    }
                } else {
                    break;
                }
            }
            merged.push(Pixel { bin1_id: top.bin1_id, bin2_id: top.bin2_id, count });
            if let Some(px) = sources[top.source].next_pixel()? {
                heap.push(HeapEntry { bin1_id: px.bin1_id, bin2_id: px.bin2_id, count: px.count, source: top.source });
            }
        }

        info!("merge produced {} pixels", merged.len());
        Ok(merged)
    }
}

fn sort_and_coalesce(pixels: &mut Vec<Pixel>) {
    pixels.sort_by_key(|p| (p.bin1_id, p.bin2_id));
    pixels.dedup_by(|a, b| {
        if (a.bin1_id, a.bin2_id) == (b.bin1_id, b.bin2_id) {
            b.count += a.count;
            true
        } else {
            false
        }
    });
}

/// Min-heap entry; `Ord` is reversed so `BinaryHeap` (a max-heap) yields
/// the smallest `(bin1_id, bin2_id)` first, same trick as the teacher
/// pack's `streaming_multiinter::HeapEntry`.
struct HeapEntry {
    bin1_id: u64,
    bin2_id: u64,
    count: f64,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.bin1_id, self.bin2_id) == (other.bin1_id, other.bin2_id)
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.bin1_id.cmp(&self.bin1_id).then(other.bin2_id.cmp(&self.bin2_id))
    }
}

fn write_spill(path: &Path, pixels: &[Pixel], compression: SpillCompression) -> Result<()> {
    let file = StdFile::create(path)?;
    let mut w: Box<dyn Write> = match compression {
        SpillCompression::None => Box::new(BufWriter::new(file)),
        SpillCompression::Gzip(level) => {
            Box::new(flate2::write::GzEncoder::new(BufWriter::new(file), flate2::Compression::new(level as u32)))
        }
        SpillCompression::Zstd(level) => Box::new(zstd::stream::Encoder::new(BufWriter::new(file), level)?.auto_finish()),
    };
    for px in pixels {
        w.write_u64::<LittleEndian>(px.bin1_id)?;
        w.write_u64::<LittleEndian>(px.bin2_id)?;
        w.write_f64::<LittleEndian>(px.count)?;
    }
    w.flush()?;
    Ok(())
}

struct SpillReader {
    r: Box<dyn Read>,
}

impl SpillReader {
    fn open(path: &Path, compression: SpillCompression) -> Result<SpillReader> {
        let file = StdFile::open(path)?;
        let r: Box<dyn Read> = match compression {
            SpillCompression::None => Box::new(BufReader::new(file)),
            SpillCompression::Gzip(_) => Box::new(flate2::read::GzDecoder::new(BufReader::new(file))),
            SpillCompression::Zstd(_) => Box::new(zstd::stream::Decoder::new(BufReader::new(file))?),
        };
        Ok(SpillReader { r })
    }

    fn next_pixel(&mut self) -> Result<Option<Pixel>> {
        let bin1_id = match self.r.read_u64::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bin2_id = self.r.read_u64::<LittleEndian>()?;
        let count = self.r.read_f64::<LittleEndian>()?;
        Ok(Some(Pixel { bin1_id, bin2_id, count }))
    }
}

/// Which container family a `load`/`merge` run targets (spec §4.9
/// "Finalize").
pub enum Target<'a> {
    Cooler { path: &'a Path, compression: CoolerCompression },
    Hic { path: &'a Path, resolutions: Vec<u32> },
}

/// Drives spill + merge + finalize for a single-resolution target,
/// writing to a temp name and renaming into place only on success (spec
/// §4.9 "a successful finalize is atomic at the filesystem level"). On
/// any error the partially written temp file is removed; `spiller`'s
/// `TempDir` cleans up spills on drop regardless of outcome.
pub fn finalize_cooler(
    spiller: PixelSpiller,
    reference: &Reference,
    bins: &BinTable,
    bin_size: u32,
    path: &Path,
    compression: CoolerCompression,
) -> Result<()> {
    let pixels = spiller.finish()?;
    let tmp_path = sibling_temp_path(path);
    let result = (|| -> Result<()> {
        let writer = CoolerWriter::create(&tmp_path, compression)?;
        writer.write_chroms(reference)?;
        writer.write_resolution("", bins, bin_size, &pixels)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            std::fs::rename(&tmp_path, path)?;
            info!("wrote {} ({} pixels)", path.display(), pixels.len());
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            warn!("ingest into {} failed, temp file removed", path.display());
            Err(e)
        }
    }
}

/// As `finalize_cooler`, but for a `.hic` target: every resolution's
/// pixel set is supplied up front (a single `load`/`merge`/`convert` run
/// targeting hic writes every requested resolution in one pass, per
/// `HicWriter::write`'s contract).
pub fn finalize_hic(
    reference: &Reference,
    resolutions: &[u32],
    matrices: &[(u32, u32)],
    path: &Path,
    mut pixels_for: impl FnMut(u32, u32, u32) -> Vec<Pixel>,
) -> Result<()> {
    let tmp_path = sibling_temp_path(path);
    let writer = HicWriter::create(&tmp_path);
    let result = writer.write(reference, resolutions, matrices, &mut pixels_for);
    match result {
        Ok(()) => {
            std::fs::rename(&tmp_path, path)?;
            info!("wrote {}", path.display());
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            warn!("ingest into {} failed, temp file removed", path.display());
            Err(e)
        }
    }
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(b1: u64, b2: u64, c: f64) -> Pixel {
        Pixel { bin1_id: b1, bin2_id: b2, count: c }
    }

    #[test]
    fn sort_and_coalesce_sums_duplicates() {
        let mut pixels = vec![px(1, 2, 1.0), px(0, 0, 5.0), px(1, 2, 3.0)];
        sort_and_coalesce(&mut pixels);
        assert_eq!(pixels, vec![px(0, 0, 5.0), px(1, 2, 4.0)]);
    }

    #[test]
    fn spiller_merges_across_chunks_with_coalescing() -> Result<()> {
        let cfg = IngestConfig { chunk_size: 2, ..Default::default() };
        let mut spiller = PixelSpiller::new(cfg)?;
        for px_ in [px(0, 1, 1.0), px(2, 2, 2.0), px(0, 1, 1.0), px(1, 1, 4.0)] {
            spiller.push(px_)?;
        }
        let merged = spiller.finish()?;
        assert_eq!(merged, vec![px(0, 1, 2.0), px(1, 1, 4.0), px(2, 2, 2.0)]);
        Ok(())
    }

    #[test]
    fn spiller_with_no_spill_still_sorts() -> Result<()> {
        let spiller = PixelSpiller::new(IngestConfig::default())?;
        let merged = spiller.finish()?;
        assert!(merged.is_empty());
        Ok(())
    }
}
