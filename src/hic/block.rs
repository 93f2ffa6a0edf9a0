use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;

use crate::error::Result;

/// One decoded `(bin1_local, bin2_local, count)` record, still in
/// block-local coordinates (spec §4.4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockRecord {
    pub bin1: u32,
    pub bin2: u32,
    pub count: f32,
}

/// Decompresses a block payload. Per spec §9's open question, v9 files mix
/// DEFLATE and LZ4 payloads without an on-disk tag; we follow the Juicer
/// reader's approach of trying DEFLATE first (valid zlib header bytes
/// `0x78 ..`) and falling back to raw LZ4-block decode otherwise.
pub fn decompress(payload: &[u8]) -> Result<Vec<u8>> {
    if looks_like_zlib(payload) {
        if let Ok(bytes) = inflate(payload) {
            return Ok(bytes);
        }
    }
    lz4_flex::block::decompress_size_prepended(payload)
        .or_else(|_| inflate(payload))
        .map_err(|e| crate::error::HictkError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))
}

fn looks_like_zlib(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x78
}

fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut dec = ZlibDecoder::new(data);
    let mut out = Vec::new();
    dec.read_to_end(&mut out)?;
    Ok(out)
}

/// Decodes a decompressed block body, grounded on `straw::read_block`
/// (xuzhougeng-hic_resolution_rs/src/straw.rs): a leading record count,
/// then (for version >= 7) an offset pair, a short/float count flag, a
/// version-9 per-axis short flag, and a one-byte layout discriminator
/// selecting between the "list of rows" (type 1) and "dense rectangle"
/// (type 2) encodings.
pub fn decode(body: &[u8], version: i32) -> Result<Vec<BlockRecord>> {
    let mut cur = Cursor::new(body);
    let n_records = cur.read_i32::<LittleEndian>()? as usize;
    let mut out = Vec::with_capacity(n_records);

    if version < 7 {
        for _ in 0..n_records {
            let bin1 = cur.read_i32::<LittleEndian>()? as u32;
            let bin2 = cur.read_i32::<LittleEndian>()? as u32;
            let count = cur.read_f32::<LittleEndian>()?;
            out.push(BlockRecord { bin1, bin2, count });
        }
        return Ok(out);
    }

    let bin1_offset = cur.read_i32::<LittleEndian>()?;
    let bin2_offset = cur.read_i32::<LittleEndian>()?;
    let use_short_counts = cur.read_u8()? == 0;
    let (mut use_short_bin1, mut use_short_bin2) = (true, true);
    if version > 8 {
        use_short_bin1 = cur.read_u8()? == 0;
        use_short_bin2 = cur.read_u8()? == 0;
    }
    let layout = cur.read_u8()?;

    match layout {
        1 => decode_list(
            &mut cur,
            bin1_offset,
            bin2_offset,
            use_short_bin1,
            use_short_bin2,
            use_short_counts,
            &mut out,
        )?,
        2 => decode_dense(&mut cur, bin1_offset, bin2_offset, use_short_counts, &mut out)?,
        _ => {}
    }

    Ok(out)
}

fn decode_list(
    cur: &mut Cursor<&[u8]>,
    bin1_offset: i32,
    bin2_offset: i32,
    use_short_bin1: bool,
    use_short_bin2: bool,
    use_short_counts: bool,
    out: &mut Vec<BlockRecord>,
) -> Result<()> {
    let row_count = if use_short_bin2 {
        cur.read_i16::<LittleEndian>()? as i32
    } else {
        cur.read_i32::<LittleEndian>()?
    };
    for _ in 0..row_count {
        let bin2 = bin2_offset
            + if use_short_bin2 {
                cur.read_i16::<LittleEndian>()? as i32
            } else {
                cur.read_i32::<LittleEndian>()?
            };
        let col_count = if use_short_bin1 {
            cur.read_i16::<LittleEndian>()? as i32
        } else {
            cur.read_i32::<LittleEndian>()?
        };
        for _ in 0..col_count {
            let bin1 = bin1_offset
                + if use_short_bin1 {
                    cur.read_i16::<LittleEndian>()? as i32
                } else {
                    cur.read_i32::<LittleEndian>()?
                };
            let count = if use_short_counts {
                cur.read_i16::<LittleEndian>()? as f32
            } else {
                cur.read_f32::<LittleEndian>()?
            };
            out.push(BlockRecord { bin1: bin1 as u32, bin2: bin2 as u32, count });
        }
    }
    Ok(())
}

fn decode_dense(
    cur: &mut Cursor<&[u8]>,
    bin1_offset: i32,
    bin2_offset: i32,
    use_short_counts: bool,
    out: &mut Vec<BlockRecord>,
) -> Result<()> {
    let n_points = cur.read_i32::<LittleEndian>()?;
    let width = cur.read_i16::<LittleEndian>()? as i32;
    for i in 0..n_points {
        let row = i / width;
        let col = i - row * width;
        let bin1 = bin1_offset + col;
        let bin2 = bin2_offset + row;
        if use_short_counts {
            let c = cur.read_i16::<LittleEndian>()?;
            if c != i16::MIN {
                out.push(BlockRecord { bin1: bin1 as u32, bin2: bin2 as u32, count: c as f32 });
            }
        } else {
            let count = cur.read_f32::<LittleEndian>()?;
            if !count.is_nan() {
                out.push(BlockRecord { bin1: bin1 as u32, bin2: bin2 as u32, count });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use byteorder::WriteBytesExt;

    use super::*;

    #[test]
    fn decode_pre_v7_is_flat_triples() {
        let mut body = Vec::new();
        body.write_i32::<LittleEndian>(2).unwrap();
        for (b1, b2, c) in [(1i32, 2i32, 3.5f32), (4, 5, 6.5)] {
            body.write_i32::<LittleEndian>(b1).unwrap();
            body.write_i32::<LittleEndian>(b2).unwrap();
            body.write_f32::<LittleEndian>(c).unwrap();
        }
        let records = decode(&body, 6).unwrap();
        assert_eq!(records, vec![
            BlockRecord { bin1: 1, bin2: 2, count: 3.5 },
            BlockRecord { bin1: 4, bin2: 5, count: 6.5 },
        ]);
    }

    #[test]
    fn decode_v9_list_layout_with_float_counts() {
        let mut body = Vec::new();
        body.write_i32::<LittleEndian>(1).unwrap(); // n_records (unused by list layout)
        body.write_i32::<LittleEndian>(10).unwrap(); // bin1_offset
        body.write_i32::<LittleEndian>(20).unwrap(); // bin2_offset
        body.write_u8(0).unwrap(); // use_short_counts = true (0 means short)
        body.write_u8(1).unwrap(); // use_short_bin1 = false (non-zero means full i32)
        body.write_u8(1).unwrap(); // use_short_bin2 = false
        body.write_u8(1).unwrap(); // layout = list
        body.write_i32::<LittleEndian>(1).unwrap(); // row_count (full i32 since use_short_bin2=false)
        body.write_i32::<LittleEndian>(0).unwrap(); // bin2 local offset
        body.write_i32::<LittleEndian>(1).unwrap(); // col_count
        body.write_i32::<LittleEndian>(0).unwrap(); // bin1 local offset
        body.write_i16::<LittleEndian>(42).unwrap(); // short count
        let records = decode(&body, 9).unwrap();
        assert_eq!(records, vec![BlockRecord { bin1: 10, bin2: 20, count: 42.0 }]);
    }

    #[test]
    fn decode_dense_layout_skips_sentinel_values() {
        let mut body = Vec::new();
        body.write_i32::<LittleEndian>(0).unwrap(); // n_records (unused by dense layout)
        body.write_i32::<LittleEndian>(100).unwrap(); // bin1_offset
        body.write_i32::<LittleEndian>(200).unwrap(); // bin2_offset
        body.write_u8(1).unwrap(); // use_short_counts = false
        body.write_u8(1).unwrap(); // use_short_bin1 (ignored by dense)
        body.write_u8(1).unwrap(); // use_short_bin2 (ignored by dense)
        body.write_u8(2).unwrap(); // layout = dense
        body.write_i32::<LittleEndian>(2).unwrap(); // n_points
        body.write_i16::<LittleEndian>(2).unwrap(); // width
        body.write_f32::<LittleEndian>(f32::NAN).unwrap();
        body.write_f32::<LittleEndian>(9.0).unwrap();
        let records = decode(&body, 9).unwrap();
        assert_eq!(records, vec![BlockRecord { bin1: 101, bin2: 200, count: 9.0 }]);
    }

    #[test]
    fn looks_like_zlib_detects_magic_byte() {
        assert!(looks_like_zlib(&[0x78, 0x9c, 0x00]));
        assert!(!looks_like_zlib(&[0x04, 0x22, 0x4d]));
        assert!(!looks_like_zlib(&[0x78]));
    }
}
