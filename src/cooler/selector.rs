use ndarray::{s, Array1};
use itertools::{izip, Itertools};
use std::mem;

use super::reader::GroupReader;
use crate::error::Result;

/// 2D range selector over one resolution's pixel table, grounded on the
/// teacher's `Selector2D` (hic-matrix/src/selector.rs). Handles the
/// symmetric / nested / non-overlapping / sequential cases needed to
/// answer an arbitrary pair of row/column bin ranges against an
/// upper-triangular pixel store.
#[derive(Debug)]
pub struct CoolerSelector {
    bin_offsets: Array1<u64>,
}

impl CoolerSelector {
    pub fn new(reader: &GroupReader) -> Result<CoolerSelector> {
        Ok(CoolerSelector { bin_offsets: reader.read_bin_offsets()? })
    }

    /// Raw `(bin1_id, bin2_id, count)` triples with `bin1 <= bin2`
    /// covering every pixel with `bin1 in [i0,i1)` and `bin2 in [j0,j1)`,
    /// reflecting across the diagonal as needed.
    pub fn fetch(
        &self,
        reader: &GroupReader,
        i0: usize,
        i1: usize,
        j0: usize,
        j1: usize,
    ) -> Result<(Vec<u64>, Vec<u64>, Vec<f64>)> {
        self.get_rectangle(reader, i0, i1, j0, j1)
    }

    fn get_rectangle(
        &self,
        reader: &GroupReader,
        mut i0: usize,
        mut i1: usize,
        mut j0: usize,
        mut j1: usize,
    ) -> Result<(Vec<u64>, Vec<u64>, Vec<f64>)> {
        let mut is;
        let mut js;
        let vs;

        if (i0, i1) == (j0, j1) {
            let (tis, tjs, tvs) = self.triu_nnz(reader, i0, i1, i0, i1)?;
            let nodiag: Vec<bool> = tis.iter().zip(tjs.iter()).map(|(&a, &b)| a != b).collect();
            let tis_nd = pick(&nodiag, &tis);
            let tjs_nd = pick(&nodiag, &tjs);
            let tvs_nd = pick(&nodiag, &tvs);

            is = [&tis[..], &tjs_nd[..]].concat();
            js = [&tjs[..], &tis_nd[..]].concat();
            vs = [&tvs[..], &tvs_nd[..]].concat();
        } else {
            let mut transpose = false;
            if j0 < i0 || (i0 == j0 && i1 < j1) {
                mem::swap(&mut i0, &mut j0);
                mem::swap(&mut i1, &mut j1);
                transpose = true;
            }

            if !overlaps(i0, i1, j0, j1) {
                let (tis, tjs, tvs) = self.triu_nnz(reader, i0, i1, j0, j1)?;
                is = tis;
                js = tjs;
                vs = tvs;
            } else if nested(i0, i1, j0, j1) {
                let (ix, jx, vx) = self.triu_nnz(reader, i0, j0, j0, j1)?;
                let (mut iy, mut jy, mut vy) = self.triu_nnz(reader, j0, j1, j0, j1)?;
                let (iz, jz, vz) = self.triu_nnz(reader, j0, j1, j1, i1)?;
                reflect_diag(&mut iy, &mut jy, &mut vy);
                is = [&ix[..], &iy[..], &iz[..]].concat();
                js = [&jx[..], &jy[..], &jz[..]].concat();
                vs = [&vx[..], &vy[..], &vz[..]].concat();
            } else {
                let (ix, jx, vx) = self.triu_nnz(reader, i0, j0, j0, i1)?;
                let (mut iy, mut jy, mut vy) = self.triu_nnz(reader, j0, i1, j0, i1)?;
                let (iz, jz, vz) = self.triu_nnz(reader, i0, i1, i1, j1)?;
                reflect_diag(&mut iy, &mut jy, &mut vy);
                is = [&ix[..], &iy[..], &iz[..]].concat();
                js = [&jx[..], &jy[..], &jz[..]].concat();
                vs = [&vx[..], &vy[..], &vz[..]].concat();
            }

            if transpose {
                mem::swap(&mut is, &mut js);
            }
        }

        Ok((is, js, vs))
    }

    fn triu_nnz(
        &self,
        reader: &GroupReader,
        i0: usize,
        i1: usize,
        j0: usize,
        j1: usize,
    ) -> Result<(Vec<u64>, Vec<u64>, Vec<f64>)> {
        if i0 >= i1 || j0 >= j1 {
            return Ok((Vec::new(), Vec::new(), Vec::new()));
        }

        let mut is = Vec::new();
        let mut js = Vec::new();
        let mut vs = Vec::new();

        let intervals = self.bin_offsets.slice(s![i0..=i1]);
        let p0 = intervals[0] as usize;
        let p1 = intervals[intervals.len() - 1] as usize;
        let (_, bin2ids, counts) = reader.read_pixel_chunk(p0, p1)?;

        for (row_id, (&lo, &hi)) in (i0..i1).zip(intervals.iter().tuple_windows()) {
            let (lo, hi) = ((lo as usize) - p0, (hi as usize) - p0);
            let cur_bins = bin2ids.slice(s![lo..hi]);
            let cur_counts = counts.slice(s![lo..hi]);

            for (&b2, &c) in izip!(cur_bins.iter(), cur_counts.iter()) {
                if (b2 as usize) >= j0 && (b2 as usize) < j1 {
                    is.push(row_id as u64);
                    js.push(b2 as u64);
                    vs.push(c);
                }
            }
        }

        Ok((is, js, vs))
    }
}

fn pick<T: Copy>(mask: &[bool], data: &[T]) -> Vec<T> {
    mask.iter().zip(data.iter()).filter_map(|(&m, &d)| m.then_some(d)).collect()
}

fn reflect_diag(is: &mut Vec<u64>, js: &mut Vec<u64>, vs: &mut Vec<f64>) {
    let nodiag: Vec<bool> = is.iter().zip(js.iter()).map(|(&a, &b)| a != b).collect();
    let is_nd = pick(&nodiag, is);
    let js_nd = pick(&nodiag, js);
    let vs_nd = pick(&nodiag, vs);
    is.extend(js_nd);
    js.extend(is_nd);
    vs.extend(vs_nd);
}

fn overlaps(i0: usize, i1: usize, j0: usize, j1: usize) -> bool {
    i0 <= j1 && j0 <= i1
}

fn nested(i0: usize, i1: usize, j0: usize, j1: usize) -> bool {
    (i0 <= j0 && j1 <= i1) || (j0 <= i0 && i1 <= j1)
}
