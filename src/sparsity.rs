//! Compressed row storage (CRS) sparsity patterns.
//!
//! A [`Sparsity`] records which entries of an `nrow × ncol` matrix are
//! structurally nonzero. Column indices within a row are strictly increasing,
//! so two patterns are structurally equal exactly when their compressed
//! representations are equal. Patterns are never mutated in place: every
//! transformation returns a new pattern, and nodes share patterns through
//! `Arc<Sparsity>`.
//!
//! Nonzeros are numbered in row-major order; this numbering is the layout of
//! every value buffer in the crate.
//!
//! Column indices and nonzero numbers are stored as `u32`. Every constructor
//! checks that both dimensions and the nonzero count stay within
//! [`MAX_INDEX`] and that `nrow * ncol` fits in `usize`.

use std::fmt;

use crate::error::{DimensionError, Error, Result};

/// Sentinel in nonzero maps: the entry has no counterpart in the source pattern.
pub const NONE: u32 = u32::MAX;

/// Largest dimension or nonzero count of a pattern.
pub const MAX_INDEX: usize = NONE as usize - 1;

fn check_shape(op: &'static str, nrow: usize, ncol: usize) -> Result<usize> {
    for (what, size) in [("row count", nrow), ("column count", ncol)] {
        if size > MAX_INDEX {
            return Err(Error::dimension(
                op,
                DimensionError::TooLarge {
                    what,
                    size,
                    max: MAX_INDEX,
                },
            ));
        }
    }
    nrow.checked_mul(ncol)
        .ok_or_else(|| Error::dimension(op, DimensionError::ShapeOverflow { nrow, ncol }))
}

fn check_nnz(op: &'static str, nnz: usize) -> Result<()> {
    if nnz > MAX_INDEX {
        return Err(Error::dimension(
            op,
            DimensionError::TooLarge {
                what: "nonzero count",
                size: nnz,
                max: MAX_INDEX,
            },
        ));
    }
    Ok(())
}

/// `u32` form of an index already bounded by [`MAX_INDEX`].
fn index32(op: &'static str, what: &'static str, i: usize, len: usize) -> Result<u32> {
    u32::try_from(i).map_err(|_| Error::out_of_range(op, what, i, len))
}

/// Immutable CRS sparsity pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "SparsityData", into = "SparsityData")
)]
pub struct Sparsity {
    nrow: usize,
    ncol: usize,
    row_ptr: Vec<usize>,
    col: Vec<u32>,
}

/// Unvalidated wire form of a [`Sparsity`].
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct SparsityData {
    nrow: usize,
    ncol: usize,
    row_ptr: Vec<usize>,
    col: Vec<u32>,
}

#[cfg(feature = "serde")]
impl TryFrom<SparsityData> for Sparsity {
    type Error = Error;

    fn try_from(d: SparsityData) -> Result<Self> {
        Sparsity::from_crs(d.nrow, d.ncol, d.row_ptr, d.col)
    }
}

#[cfg(feature = "serde")]
impl From<Sparsity> for SparsityData {
    fn from(s: Sparsity) -> Self {
        SparsityData {
            nrow: s.nrow,
            ncol: s.ncol,
            row_ptr: s.row_ptr,
            col: s.col,
        }
    }
}

impl Sparsity {
    // ── Construction ──

    /// Build from raw CRS arrays, validating every invariant.
    pub fn from_crs(nrow: usize, ncol: usize, row_ptr: Vec<usize>, col: Vec<u32>) -> Result<Self> {
        const OP: &str = "Sparsity::from_crs";
        check_shape(OP, nrow, ncol)?;
        check_nnz(OP, col.len())?;
        if row_ptr.len() != nrow + 1 {
            return Err(Error::mismatch(OP, "row pointer length", nrow + 1, row_ptr.len()));
        }
        if row_ptr[0] != 0 {
            return Err(Error::mismatch(OP, "first row pointer", 0, row_ptr[0]));
        }
        if row_ptr[nrow] != col.len() {
            return Err(Error::mismatch(OP, "last row pointer", col.len(), row_ptr[nrow]));
        }
        for r in 0..nrow {
            let (lo, hi) = (row_ptr[r], row_ptr[r + 1]);
            if lo > hi || hi > col.len() {
                return Err(Error::out_of_range(OP, "row pointer", hi, col.len() + 1));
            }
            let row = &col[lo..hi];
            for (k, &c) in row.iter().enumerate() {
                if c as usize >= ncol {
                    return Err(Error::out_of_range(OP, "column", c as usize, ncol));
                }
                if k > 0 && row[k - 1] >= c {
                    return Err(Error::mismatch(
                        OP,
                        format!("strictly increasing columns in row {r}"),
                        row[k - 1] as usize + 1,
                        c as usize,
                    ));
                }
            }
        }
        Ok(Sparsity {
            nrow,
            ncol,
            row_ptr,
            col,
        })
    }

    /// Build from unordered `(row, col)` coordinates. Duplicates are merged.
    pub fn from_triplets(nrow: usize, ncol: usize, rows: &[usize], cols: &[usize]) -> Result<Self> {
        const OP: &str = "Sparsity::from_triplets";
        check_shape(OP, nrow, ncol)?;
        if rows.len() != cols.len() {
            return Err(Error::mismatch(OP, "column list", rows.len(), cols.len()));
        }
        let mut entries = Vec::with_capacity(rows.len());
        for (&r, &c) in rows.iter().zip(cols) {
            if r >= nrow {
                return Err(Error::out_of_range(OP, "row", r, nrow));
            }
            if c >= ncol {
                return Err(Error::out_of_range(OP, "column", c, ncol));
            }
            entries.push((r, index32(OP, "column", c, ncol)?));
        }
        entries.sort_unstable();
        entries.dedup();
        check_nnz(OP, entries.len())?;
        Ok(Self::from_sorted_entries(nrow, ncol, &entries))
    }

    /// Build from row-major sorted, duplicate-free entries.
    pub(crate) fn from_sorted_entries(nrow: usize, ncol: usize, entries: &[(usize, u32)]) -> Self {
        let mut row_ptr = vec![0usize; nrow + 1];
        for &(r, _) in entries {
            row_ptr[r + 1] += 1;
        }
        for r in 0..nrow {
            row_ptr[r + 1] += row_ptr[r];
        }
        Sparsity {
            nrow,
            ncol,
            row_ptr,
            col: entries.iter().map(|&(_, c)| c).collect(),
        }
    }

    /// [`from_rows`](Self::from_rows) for a shape that is not yet known to be valid.
    fn from_rows_checked(op: &'static str, ncol: usize, rows: Vec<Vec<u32>>) -> Result<Self> {
        check_shape(op, rows.len(), ncol)?;
        check_nnz(op, rows.iter().map(Vec::len).sum())?;
        Ok(Self::from_rows(ncol, rows))
    }

    /// Build from per-row column lists that are already sorted and unique.
    pub(crate) fn from_rows(ncol: usize, rows: Vec<Vec<u32>>) -> Self {
        let nrow = rows.len();
        let mut row_ptr = Vec::with_capacity(nrow + 1);
        row_ptr.push(0);
        let mut col = Vec::with_capacity(rows.iter().map(Vec::len).sum());
        for row in rows {
            col.extend_from_slice(&row);
            row_ptr.push(col.len());
        }
        Sparsity {
            nrow,
            ncol,
            row_ptr,
            col,
        }
    }

    /// Pattern with every entry nonzero.
    pub fn dense(nrow: usize, ncol: usize) -> Result<Self> {
        const OP: &str = "Sparsity::dense";
        let numel = check_shape(OP, nrow, ncol)?;
        check_nnz(OP, numel)?;
        let n32 = index32(OP, "column count", ncol, MAX_INDEX)?;
        let row_ptr = (0..=nrow).map(|r| r * ncol).collect();
        let col = (0..nrow).flat_map(|_| 0..n32).collect();
        Ok(Sparsity {
            nrow,
            ncol,
            row_ptr,
            col,
        })
    }

    /// Pattern without nonzeros.
    pub fn empty(nrow: usize, ncol: usize) -> Result<Self> {
        check_shape("Sparsity::empty", nrow, ncol)?;
        Ok(Sparsity {
            nrow,
            ncol,
            row_ptr: vec![0; nrow + 1],
            col: Vec::new(),
        })
    }

    /// Dense `1 × 1` pattern.
    pub fn scalar() -> Self {
        Sparsity {
            nrow: 1,
            ncol: 1,
            row_ptr: vec![0, 1],
            col: vec![0],
        }
    }

    /// Dense column vector `n × 1`.
    pub fn column(n: usize) -> Result<Self> {
        Self::dense(n, 1)
    }

    /// `n × n` diagonal pattern.
    pub fn diagonal(n: usize) -> Result<Self> {
        const OP: &str = "Sparsity::diagonal";
        check_shape(OP, n, n)?;
        let n32 = index32(OP, "size", n, MAX_INDEX)?;
        Ok(Sparsity {
            nrow: n,
            ncol: n,
            row_ptr: (0..=n).collect(),
            col: (0..n32).collect(),
        })
    }

    // ── Queries ──

    /// Number of rows.
    #[inline]
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    /// Number of columns.
    #[inline]
    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// `(nrow, ncol)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrow, self.ncol)
    }

    /// Number of structural nonzeros.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.col.len()
    }

    /// Number of entries, zero or not.
    #[inline]
    pub fn numel(&self) -> usize {
        self.nrow * self.ncol
    }

    /// True if every entry is structurally nonzero.
    pub fn is_dense(&self) -> bool {
        self.nnz() == self.numel()
    }

    /// True for a `1 × 1` pattern, with or without its nonzero.
    pub fn is_scalar(&self) -> bool {
        self.nrow == 1 && self.ncol == 1
    }

    /// True if the pattern is a dense `1 × 1` matrix.
    pub fn is_dense_scalar(&self) -> bool {
        self.is_scalar() && self.nnz() == 1
    }

    /// Column indices of row `i`, strictly increasing.
    #[inline]
    pub fn row(&self, i: usize) -> &[u32] {
        &self.col[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// Row pointer array (length `nrow + 1`).
    #[inline]
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    /// Column index of every nonzero.
    #[inline]
    pub fn col_indices(&self) -> &[u32] {
        &self.col
    }

    /// Row index of every nonzero.
    pub fn row_indices(&self) -> Vec<u32> {
        let mut rows = Vec::with_capacity(self.nnz());
        for r in 0..self.nrow {
            rows.extend(std::iter::repeat(r as u32).take(self.row_ptr[r + 1] - self.row_ptr[r]));
        }
        rows
    }

    /// Iterate over `(row, col)` of all nonzeros in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.nrow).flat_map(move |r| self.row(r).iter().map(move |&c| (r, c as usize)))
    }

    /// Position of entry `(r, c)` in the nonzero numbering, if structurally nonzero.
    ///
    /// Binary search within the row: `O(log(row length))`.
    pub fn nz_index(&self, r: usize, c: usize) -> Option<usize> {
        if r >= self.nrow || c >= self.ncol {
            return None;
        }
        self.row(r)
            .binary_search(&(c as u32))
            .ok()
            .map(|k| self.row_ptr[r] + k)
    }

    /// True if entry `(r, c)` is structurally nonzero.
    pub fn has_nonzero(&self, r: usize, c: usize) -> bool {
        self.nz_index(r, c).is_some()
    }

    // ── Transformations ──

    fn check_same_shape(&self, other: &Sparsity, op: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::mismatch(
                op,
                format!("shape {:?} against {:?}", other.shape(), self.shape()),
                self.numel(),
                other.numel(),
            ));
        }
        Ok(())
    }

    /// Entries nonzero in either pattern.
    pub fn union(&self, other: &Sparsity) -> Result<Sparsity> {
        self.check_same_shape(other, "Sparsity::union")?;
        let rows = (0..self.nrow)
            .map(|r| {
                let (a, b) = (self.row(r), other.row(r));
                let mut out = Vec::with_capacity(a.len() + b.len());
                let (mut i, mut j) = (0, 0);
                while i < a.len() || j < b.len() {
                    if j == b.len() || (i < a.len() && a[i] < b[j]) {
                        out.push(a[i]);
                        i += 1;
                    } else if i == a.len() || b[j] < a[i] {
                        out.push(b[j]);
                        j += 1;
                    } else {
                        out.push(a[i]);
                        i += 1;
                        j += 1;
                    }
                }
                out
            })
            .collect();
        Ok(Sparsity::from_rows(self.ncol, rows))
    }

    /// Entries nonzero in both patterns.
    pub fn intersection(&self, other: &Sparsity) -> Result<Sparsity> {
        self.check_same_shape(other, "Sparsity::intersection")?;
        let rows = (0..self.nrow)
            .map(|r| {
                let b = other.row(r);
                self.row(r)
                    .iter()
                    .copied()
                    .filter(|c| b.binary_search(c).is_ok())
                    .collect()
            })
            .collect();
        Ok(Sparsity::from_rows(self.ncol, rows))
    }

    /// Transposed pattern.
    pub fn transpose(&self) -> Sparsity {
        self.transpose_with_mapping().0
    }

    /// Transposed pattern plus the nonzero permutation:
    /// `mapping[k]` is the nonzero of `self` that lands at nonzero `k` of the result.
    pub fn transpose_with_mapping(&self) -> (Sparsity, Vec<u32>) {
        let mut row_ptr = vec![0usize; self.ncol + 1];
        for &c in &self.col {
            row_ptr[c as usize + 1] += 1;
        }
        for c in 0..self.ncol {
            row_ptr[c + 1] += row_ptr[c];
        }
        let mut next = row_ptr.clone();
        let mut col = vec![0u32; self.nnz()];
        let mut mapping = vec![0u32; self.nnz()];
        for r in 0..self.nrow {
            for k in self.row_ptr[r]..self.row_ptr[r + 1] {
                let c = self.col[k] as usize;
                let dst = next[c];
                next[c] += 1;
                col[dst] = r as u32;
                mapping[dst] = k as u32;
            }
        }
        (
            Sparsity {
                nrow: self.ncol,
                ncol: self.nrow,
                row_ptr,
                col,
            },
            mapping,
        )
    }

    /// Pattern of the matrix product `self · other`.
    pub fn product(&self, other: &Sparsity) -> Result<Sparsity> {
        if self.ncol != other.nrow {
            return Err(Error::mismatch(
                "Sparsity::product",
                "inner dimension",
                self.ncol,
                other.nrow,
            ));
        }
        check_shape("Sparsity::product", self.nrow, other.ncol)?;
        let mut marker = vec![usize::MAX; other.ncol];
        let rows = (0..self.nrow)
            .map(|r| {
                let mut out = Vec::new();
                for &k in self.row(r) {
                    for &c in other.row(k as usize) {
                        if marker[c as usize] != r {
                            marker[c as usize] = r;
                            out.push(c);
                        }
                    }
                }
                out.sort_unstable();
                out
            })
            .collect();
        Sparsity::from_rows_checked("Sparsity::product", other.ncol, rows)
    }

    /// Extract the submatrix at `rows × cols`. Indices may repeat or be unordered.
    ///
    /// Returns the pattern and, for each of its nonzeros, the source nonzero in `self`.
    pub fn sub(&self, rows: &[usize], cols: &[usize]) -> Result<(Sparsity, Vec<u32>)> {
        const OP: &str = "Sparsity::sub";
        if let Some(&r) = rows.iter().find(|&&r| r >= self.nrow) {
            return Err(Error::out_of_range(OP, "row", r, self.nrow));
        }
        if let Some(&c) = cols.iter().find(|&&c| c >= self.ncol) {
            return Err(Error::out_of_range(OP, "column", c, self.ncol));
        }
        check_shape(OP, rows.len(), cols.len())?;
        // Old column -> new columns selecting it.
        let mut targets: Vec<Vec<u32>> = vec![Vec::new(); self.ncol];
        for (j, &c) in cols.iter().enumerate() {
            targets[c].push(index32(OP, "column", j, cols.len())?);
        }
        let mut out_rows = Vec::with_capacity(rows.len());
        let mut mapping = Vec::new();
        let mut scratch: Vec<(u32, u32)> = Vec::new();
        for &r in rows {
            scratch.clear();
            for k in self.row_ptr[r]..self.row_ptr[r + 1] {
                for &j in &targets[self.col[k] as usize] {
                    scratch.push((j, k as u32));
                }
            }
            scratch.sort_unstable();
            out_rows.push(scratch.iter().map(|&(j, _)| j).collect());
            mapping.extend(scratch.iter().map(|&(_, k)| k));
        }
        Ok((Sparsity::from_rows_checked(OP, cols.len(), out_rows)?, mapping))
    }

    /// Same entries, reinterpreted as `nrow × ncol` in row-major order.
    ///
    /// The nonzero numbering is unchanged.
    pub fn reshape(&self, nrow: usize, ncol: usize) -> Result<Sparsity> {
        const OP: &str = "Sparsity::reshape";
        let numel = check_shape(OP, nrow, ncol)?;
        if numel != self.numel() {
            return Err(Error::mismatch(OP, "element count", self.numel(), numel));
        }
        let mut entries = Vec::with_capacity(self.nnz());
        for (r, c) in self.iter() {
            let l = r * self.ncol + c;
            entries.push((l / ncol, index32(OP, "column", l % ncol, ncol)?));
        }
        Ok(Sparsity::from_sorted_entries(nrow, ncol, &entries))
    }

    /// Place patterns side by side. All parts must have the same number of rows.
    pub fn horzcat(parts: &[&Sparsity]) -> Result<Sparsity> {
        let nrow = parts.first().map_or(0, |p| p.nrow);
        if let Some(p) = parts.iter().find(|p| p.nrow != nrow) {
            return Err(Error::mismatch("Sparsity::horzcat", "row count", nrow, p.nrow));
        }
        let ncol = parts
            .iter()
            .try_fold(0usize, |acc, p| acc.checked_add(p.ncol))
            .unwrap_or(usize::MAX);
        check_shape("Sparsity::horzcat", nrow, ncol)?;
        let rows = (0..nrow)
            .map(|r| {
                let mut out = Vec::new();
                let mut offset = 0u32;
                for p in parts {
                    out.extend(p.row(r).iter().map(|&c| c + offset));
                    offset += p.ncol as u32;
                }
                out
            })
            .collect();
        Sparsity::from_rows_checked("Sparsity::horzcat", ncol, rows)
    }

    /// Stack patterns vertically. All parts must have the same number of columns.
    pub fn vertcat(parts: &[&Sparsity]) -> Result<Sparsity> {
        let ncol = parts.first().map_or(0, |p| p.ncol);
        if let Some(p) = parts.iter().find(|p| p.ncol != ncol) {
            return Err(Error::mismatch("Sparsity::vertcat", "column count", ncol, p.ncol));
        }
        let nrow = parts
            .iter()
            .try_fold(0usize, |acc, p| acc.checked_add(p.nrow))
            .unwrap_or(usize::MAX);
        check_shape("Sparsity::vertcat", nrow, ncol)?;
        let rows = parts
            .iter()
            .flat_map(|p| (0..p.nrow).map(move |r| p.row(r).to_vec()))
            .collect();
        Sparsity::from_rows_checked("Sparsity::vertcat", ncol, rows)
    }

    /// For every nonzero of `self`, the matching nonzero of `src` (same shape),
    /// or [`NONE`] where `src` is structurally zero.
    pub(crate) fn nz_map_from(&self, src: &Sparsity) -> Vec<u32> {
        debug_assert_eq!(self.shape(), src.shape());
        let mut map = Vec::with_capacity(self.nnz());
        for r in 0..self.nrow {
            let base = src.row_ptr[r];
            let s = src.row(r);
            let mut j = 0;
            for &c in self.row(r) {
                while j < s.len() && s[j] < c {
                    j += 1;
                }
                if j < s.len() && s[j] == c {
                    map.push((base + j) as u32);
                } else {
                    map.push(NONE);
                }
            }
        }
        map
    }
}

impl fmt::Display for Sparsity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dense() {
            write!(f, "{}x{}", self.nrow, self.ncol)
        } else {
            write!(f, "{}x{},{}nz", self.nrow, self.ncol, self.nnz())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiagonal(n: usize) -> Sparsity {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for i in 0..n {
            for j in i.saturating_sub(1)..(i + 2).min(n) {
                rows.push(i);
                cols.push(j);
            }
        }
        Sparsity::from_triplets(n, n, &rows, &cols).unwrap()
    }

    #[test]
    fn triplets_sort_and_dedup() {
        let sp = Sparsity::from_triplets(2, 3, &[1, 0, 1, 0], &[2, 1, 0, 1]).unwrap();
        assert_eq!(sp.row(0), &[1]);
        assert_eq!(sp.row(1), &[0, 2]);
        assert_eq!(sp.nnz(), 3);
    }

    #[test]
    fn triplets_out_of_range() {
        assert!(Sparsity::from_triplets(2, 2, &[2], &[0]).is_err());
        assert!(Sparsity::from_triplets(2, 2, &[0], &[5]).is_err());
    }

    #[test]
    fn crs_rejects_unsorted_row() {
        assert!(Sparsity::from_crs(1, 3, vec![0, 2], vec![2, 1]).is_err());
        assert!(Sparsity::from_crs(1, 3, vec![0, 2], vec![1, 1]).is_err());
        assert!(Sparsity::from_crs(1, 3, vec![0, 2], vec![0, 2]).is_ok());
    }

    #[test]
    fn nz_index_binary_search() {
        let sp = tridiagonal(4);
        assert_eq!(sp.nz_index(0, 0), Some(0));
        assert_eq!(sp.nz_index(1, 2), Some(4));
        assert_eq!(sp.nz_index(0, 3), None);
        assert!(!sp.has_nonzero(3, 0));
        assert!(!sp.has_nonzero(9, 0));
    }

    #[test]
    fn union_and_intersection() {
        let a = Sparsity::diagonal(3).unwrap();
        let b = Sparsity::from_triplets(3, 3, &[0, 2], &[2, 2]).unwrap();
        let u = a.union(&b).unwrap();
        assert_eq!(u.row(0), &[0, 2]);
        assert_eq!(u.row(2), &[2]);
        assert_eq!(u.nnz(), 4);
        let i = a.intersection(&b).unwrap();
        assert_eq!(i.nnz(), 1);
        assert!(i.has_nonzero(2, 2));
        assert!(a.union(&Sparsity::dense(2, 3).unwrap()).is_err());
    }

    #[test]
    fn transpose_roundtrip_and_mapping() {
        let sp = Sparsity::from_triplets(2, 3, &[0, 0, 1], &[0, 2, 1]).unwrap();
        let (t, map) = sp.transpose_with_mapping();
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.row(0), &[0]);
        assert_eq!(t.row(1), &[1]);
        assert_eq!(t.row(2), &[0]);
        // t nonzeros: (0,0)<-0, (1,1)<-2, (2,0)<-1
        assert_eq!(map, vec![0, 2, 1]);
        assert_eq!(t.transpose(), sp);
    }

    #[test]
    fn product_pattern() {
        let a = Sparsity::from_triplets(2, 2, &[0, 1], &[1, 0]).unwrap();
        let b = Sparsity::from_triplets(2, 3, &[0, 1, 1], &[2, 0, 1]).unwrap();
        let p = a.product(&b).unwrap();
        assert_eq!(p.row(0), &[0, 1]);
        assert_eq!(p.row(1), &[2]);
        assert!(a.product(&Sparsity::dense(3, 1).unwrap()).is_err());
    }

    #[test]
    fn sub_with_repeats() {
        let sp = tridiagonal(3);
        let (s, map) = sp.sub(&[2, 0], &[0, 0, 1]).unwrap();
        assert_eq!(s.shape(), (2, 3));
        // row 2 of tridiagonal has cols {1, 2}: only col 1 selected (new col 2)
        assert_eq!(s.row(0), &[2]);
        assert_eq!(s.row(1), &[0, 1, 2]);
        assert_eq!(map, vec![5, 0, 0, 1]);
    }

    #[test]
    fn reshape_keeps_numbering() {
        let sp = Sparsity::from_triplets(2, 2, &[0, 1], &[1, 0]).unwrap();
        let r = sp.reshape(4, 1).unwrap();
        assert_eq!(r.row_indices(), vec![1, 2]);
        assert!(sp.reshape(3, 1).is_err());
    }

    #[test]
    fn concatenation() {
        let a = Sparsity::diagonal(2).unwrap();
        let b = Sparsity::dense(2, 1).unwrap();
        let h = Sparsity::horzcat(&[&a, &b]).unwrap();
        assert_eq!(h.row(0), &[0, 2]);
        assert_eq!(h.row(1), &[1, 2]);
        let v = Sparsity::vertcat(&[&a, &Sparsity::empty(1, 2).unwrap()]).unwrap();
        assert_eq!(v.shape(), (3, 2));
        assert_eq!(v.nnz(), 2);
        assert!(Sparsity::vertcat(&[&a, &b]).is_err());
    }

    #[test]
    fn empty_patterns_propagate() {
        let e = Sparsity::empty(0, 0).unwrap();
        assert_eq!(e.union(&e).unwrap(), e);
        assert_eq!(e.transpose(), e);
        assert_eq!(e.product(&Sparsity::empty(0, 4).unwrap()).unwrap().shape(), (0, 4));
        assert!(e.is_dense());
        assert_eq!(Sparsity::horzcat(&[]).unwrap().shape(), (0, 0));
    }

    #[test]
    fn nz_map_marks_missing() {
        let dense = Sparsity::dense(2, 2).unwrap();
        let diag = Sparsity::diagonal(2).unwrap();
        assert_eq!(dense.nz_map_from(&diag), vec![0, NONE, NONE, 1]);
    }

    fn too_large(err: Error) -> (&'static str, usize) {
        match err {
            Error::Dimension {
                reason: DimensionError::TooLarge { what, size, .. },
                ..
            } => (what, size),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn columns_beyond_u32_rejected() {
        let wide = MAX_INDEX + 2;
        let err = Sparsity::from_triplets(1, wide, &[0], &[wide - 1]).unwrap_err();
        assert_eq!(too_large(err), ("column count", wide));
        assert_eq!(too_large(Sparsity::dense(1, wide).unwrap_err()), ("column count", wide));
        assert_eq!(too_large(Sparsity::diagonal(wide).unwrap_err()), ("row count", wide));
        assert_eq!(too_large(Sparsity::empty(wide, 1).unwrap_err()), ("row count", wide));
        let err = Sparsity::from_crs(1, wide, vec![0, 0], Vec::new()).unwrap_err();
        assert_eq!(too_large(err), ("column count", wide));
    }

    #[test]
    fn reshape_and_concat_sizes_checked() {
        let sp = Sparsity::from_triplets(2, 3, &[1], &[2]).unwrap();
        assert_eq!(too_large(sp.reshape(usize::MAX, 2).unwrap_err()).0, "row count");
        assert!(sp.reshape(4, 2).is_err());
        let flat = sp.reshape(1, 6).unwrap();
        assert_eq!(flat.iter().collect::<Vec<_>>(), vec![(0, 5)]);

        let half = Sparsity::empty(1, MAX_INDEX / 2 + 1).unwrap();
        let err = Sparsity::horzcat(&[&half, &half]).unwrap_err();
        assert_eq!(too_large(err).0, "column count");
    }
}
