use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{HictkError, Result};
use crate::reference::Reference;

pub const MAGIC: &[u8] = b"HIC";

/// Parsed `.hic` file header (spec §4.4.1), grounded on the teacher-adjacent
/// `straw::HicFile::open` (xuzhougeng-hic_resolution_rs/src/straw.rs), with
/// the genome-id/chromosome/resolution reads kept in the same field order
/// as that reference reader.
#[derive(Debug, Clone)]
pub struct HicHeader {
    pub version: i32,
    pub master_index_offset: i64,
    pub genome_id: String,
    pub attributes: BTreeMap<String, String>,
    pub reference: Reference,
    pub bp_resolutions: Vec<u32>,
    pub frag_resolutions: Vec<u32>,
}

impl HicHeader {
    pub fn read<R: Read + Seek>(r: &mut R) -> Result<HicHeader> {
        let mut magic = [0u8; 3];
        r.read_exact(&mut magic)?;
        let mut nul = [0u8; 1];
        r.read_exact(&mut nul)?;
        if magic != MAGIC || nul != [0u8] {
            return Err(bad_format());
        }

        let version = r.read_i32::<LittleEndian>()?;
        if version != 8 && version != 9 {
            return Err(bad_format());
        }

        let master_index_offset = r.read_i64::<LittleEndian>()?;
        let genome_id = read_cstring(r)?;

        if version > 8 {
            let _nvi_pos = r.read_i64::<LittleEndian>()?;
            let _nvi_len = r.read_i64::<LittleEndian>()?;
        }

        let n_attrs = r.read_i32::<LittleEndian>()?;
        let mut attributes = BTreeMap::new();
        for _ in 0..n_attrs {
            let key = read_cstring(r)?;
            let value = read_cstring(r)?;
            attributes.insert(key, value);
        }

        let n_chroms = r.read_i32::<LittleEndian>()? as usize;
        let mut names = Vec::with_capacity(n_chroms);
        let mut lengths = Vec::with_capacity(n_chroms);
        for _ in 0..n_chroms {
            let name = read_cstring(r)?;
            let length = if version > 8 {
                r.read_i64::<LittleEndian>()?
            } else {
                r.read_i32::<LittleEndian>()? as i64
            };
            names.push(name);
            lengths.push(length.max(0) as u64);
        }

        let n_bp = r.read_i32::<LittleEndian>()? as usize;
        let mut bp_resolutions = Vec::with_capacity(n_bp);
        for _ in 0..n_bp {
            bp_resolutions.push(r.read_i32::<LittleEndian>()? as u32);
        }

        let n_frag = r.read_i32::<LittleEndian>()? as usize;
        let mut frag_resolutions = Vec::with_capacity(n_frag);
        for _ in 0..n_frag {
            frag_resolutions.push(r.read_i32::<LittleEndian>()? as u32);
        }

        // the "All"/"assembly" pseudo-chromosome at rank 0 carries length 0
        // in real Juicer files; drop entries with a non-positive length so
        // the Reference invariant (all lengths positive) holds, matching
        // the reference reader's `index > 0` filter.
        let mut real_names = Vec::with_capacity(names.len());
        let mut real_lengths = Vec::with_capacity(lengths.len());
        for (name, &orig_len) in names.iter().zip(lengths.iter()) {
            if orig_len > 0 {
                real_names.push(name.clone());
                real_lengths.push(orig_len);
            }
        }
        let reference = Reference::new(real_names, real_lengths)?;

        Ok(HicHeader {
            version,
            master_index_offset,
            genome_id,
            attributes,
            reference,
            bp_resolutions,
            frag_resolutions,
        })
    }

    pub fn seek_to_master(&self, r: &mut (impl Read + Seek)) -> Result<()> {
        r.seek(SeekFrom::Start(self.master_index_offset as u64))?;
        if self.version > 8 {
            let _ = r.read_i64::<LittleEndian>()?;
        } else {
            let _ = r.read_i32::<LittleEndian>()?;
        }
        Ok(())
    }
}

fn bad_format() -> HictkError {
    HictkError::BadFileFormat { path: std::path::PathBuf::from("<hic stream>") }
}

pub fn read_cstring<R: Read>(r: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        buf.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use byteorder::WriteBytesExt;

    use super::*;

    fn write_cstring(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }

    fn v9_header_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.push(0);
        buf.write_i32::<LittleEndian>(9).unwrap();
        buf.write_i64::<LittleEndian>(1234).unwrap(); // master index offset
        write_cstring(&mut buf, "hg38");
        buf.write_i64::<LittleEndian>(0).unwrap(); // nvi_pos (v9 only)
        buf.write_i64::<LittleEndian>(0).unwrap(); // nvi_len (v9 only)
        buf.write_i32::<LittleEndian>(1).unwrap(); // n_attrs
        write_cstring(&mut buf, "software");
        write_cstring(&mut buf, "juicer");
        buf.write_i32::<LittleEndian>(3).unwrap(); // n_chroms, incl. pseudo "All" at 0
        write_cstring(&mut buf, "All");
        buf.write_i64::<LittleEndian>(0).unwrap();
        write_cstring(&mut buf, "chr1");
        buf.write_i64::<LittleEndian>(1000).unwrap();
        write_cstring(&mut buf, "chr2");
        buf.write_i64::<LittleEndian>(500).unwrap();
        buf.write_i32::<LittleEndian>(2).unwrap(); // n_bp resolutions
        buf.write_i32::<LittleEndian>(10000).unwrap();
        buf.write_i32::<LittleEndian>(100000).unwrap();
        buf.write_i32::<LittleEndian>(0).unwrap(); // n_frag resolutions
        buf
    }

    #[test]
    fn reads_v9_header_and_drops_zero_length_pseudo_chromosome() {
        let bytes = v9_header_bytes();
        let mut cursor = Cursor::new(bytes);
        let header = HicHeader::read(&mut cursor).unwrap();
        assert_eq!(header.version, 9);
        assert_eq!(header.master_index_offset, 1234);
        assert_eq!(header.genome_id, "hg38");
        assert_eq!(header.attributes.get("software"), Some(&"juicer".to_string()));
        assert_eq!(header.reference.names(), &["chr1", "chr2"]);
        assert_eq!(header.reference.lengths(), &[1000, 500]);
        assert_eq!(header.bp_resolutions, vec![10000, 100000]);
        assert!(header.frag_resolutions.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = v9_header_bytes();
        bytes[0] = b'X';
        let mut cursor = Cursor::new(bytes);
        assert!(HicHeader::read(&mut cursor).is_err());
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.push(0);
        bytes.write_i32::<LittleEndian>(7).unwrap();
        let mut cursor = Cursor::new(bytes);
        assert!(HicHeader::read(&mut cursor).is_err());
    }

    #[test]
    fn read_cstring_stops_at_nul() {
        let mut cursor = Cursor::new(b"abc\0def".to_vec());
        assert_eq!(read_cstring(&mut cursor).unwrap(), "abc");
    }
}
