//! Graph coloring for compressed Jacobian and Hessian evaluation.
//!
//! Columns (or rows) that share a color are seeded together in one sweep.
//! Every coloring is greedy and best-effort in the number of colors, and is
//! checked for soundness before it is handed out: two entries that would be
//! summed into the same compressed value are reported as
//! [`Error::ColoringFailure`].

use std::collections::HashSet;

use log::debug;

use crate::config::SweepMode;
use crate::error::{Error, Result};
use crate::sparsity::{Sparsity, NONE};

/// Color per vertex. Vertices that need no sweep carry [`NONE`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coloring {
    colors: Vec<u32>,
    ncolors: usize,
}

impl Coloring {
    /// Build from explicit colors. `ncolors` is one past the largest color used.
    pub fn new(colors: Vec<u32>) -> Self {
        let ncolors = colors
            .iter()
            .filter(|&&c| c != NONE)
            .map(|&c| c as usize + 1)
            .max()
            .unwrap_or(0);
        Coloring { colors, ncolors }
    }

    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    pub fn ncolors(&self) -> usize {
        self.ncolors
    }

    /// Color of vertex `v`, or `None` if it needs no sweep.
    pub fn color(&self, v: usize) -> Option<usize> {
        match self.colors[v] {
            NONE => None,
            c => Some(c as usize),
        }
    }

    /// Seed pattern, `ncolors × nvertices`: row `k` lists the vertices of color `k`.
    pub fn seeds(&self) -> Sparsity {
        let mut rows = vec![Vec::new(); self.ncolors];
        for (v, &c) in self.colors.iter().enumerate() {
            if c != NONE {
                rows[c as usize].push(v as u32);
            }
        }
        Sparsity::from_rows(self.colors.len(), rows)
    }
}

/// Split of a Jacobian's entries between forward and adjoint sweeps.
///
/// Entries in rows with an adjoint color are recovered from adjoint sweeps;
/// all other entries from forward sweeps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    forward: Coloring,
    adjoint: Coloring,
}

impl Partition {
    /// Column coloring for forward sweeps.
    pub fn forward(&self) -> &Coloring {
        &self.forward
    }

    /// Row coloring for adjoint sweeps.
    pub fn adjoint(&self) -> &Coloring {
        &self.adjoint
    }

    /// Forward seed pattern, `nfwd × ncol`.
    pub fn forward_seeds(&self) -> Sparsity {
        self.forward.seeds()
    }

    /// Adjoint seed pattern, `nadj × nrow`.
    pub fn adjoint_seeds(&self) -> Sparsity {
        self.adjoint.seeds()
    }

    pub fn nfwd(&self) -> usize {
        self.forward.ncolors
    }

    pub fn nadj(&self) -> usize {
        self.adjoint.ncolors
    }

    /// Total number of directional sweeps.
    pub fn nsweeps(&self) -> usize {
        self.nfwd() + self.nadj()
    }

    /// True if row `r` is recovered from adjoint sweeps.
    pub fn is_adjoint_row(&self, r: usize) -> bool {
        self.adjoint.colors[r] != NONE
    }
}

/// Greedy coloring of the columns of `j`, largest conflict degree first.
///
/// A column is a vertex when `vertex(c)` holds and it has a nonzero in a row
/// with `row(r)`; two vertices conflict when they share such a row.
fn greedy_columns(
    j: &Sparsity,
    jt: &Sparsity,
    row: impl Fn(usize) -> bool,
    vertex: impl Fn(usize) -> bool,
) -> Coloring {
    let ncol = j.ncol();
    let mut stamp = vec![usize::MAX; ncol];
    let mut degree = vec![0usize; ncol];
    let mut order = Vec::new();
    for c in 0..ncol {
        if !vertex(c) {
            continue;
        }
        let mut needed = false;
        for &r in jt.row(c) {
            let r = r as usize;
            if !row(r) {
                continue;
            }
            needed = true;
            for &c2 in j.row(r) {
                let c2 = c2 as usize;
                if c2 != c && vertex(c2) && stamp[c2] != c {
                    stamp[c2] = c;
                    degree[c] += 1;
                }
            }
        }
        if needed {
            order.push(c);
        }
    }
    order.sort_by(|&a, &b| degree[b].cmp(&degree[a]));

    let mut colors = vec![NONE; ncol];
    let mut forbidden = vec![usize::MAX; ncol];
    for &c in &order {
        for &r in jt.row(c) {
            let r = r as usize;
            if !row(r) {
                continue;
            }
            for &c2 in j.row(r) {
                let k = colors[c2 as usize];
                if k != NONE {
                    forbidden[k as usize] = c;
                }
            }
        }
        let mut k = 0;
        while forbidden[k] == c {
            k += 1;
        }
        colors[c] = k as u32;
    }
    Coloring::new(colors)
}

/// Color the columns of `j` so no two columns of one color share a row.
pub fn column_coloring(j: &Sparsity) -> Coloring {
    let jt = j.transpose();
    let coloring = greedy_columns(j, &jt, |_| true, |_| true);
    debug!(
        "column coloring of {}: {} color(s) for {} column(s)",
        j,
        coloring.ncolors,
        j.ncol()
    );
    coloring
}

/// Color the rows of `j` so no two rows of one color share a column.
pub fn row_coloring(j: &Sparsity) -> Coloring {
    let jt = j.transpose();
    let coloring = greedy_columns(&jt, j, |_| true, |_| true);
    debug!(
        "row coloring of {}: {} color(s) for {} row(s)",
        j,
        coloring.ncolors,
        j.nrow()
    );
    coloring
}

fn split(j: &Sparsity, jt: &Sparsity, threshold: usize) -> Partition {
    let heavy = |r: usize| j.row(r).len() > threshold;
    let forward = greedy_columns(j, jt, |r| !heavy(r), |_| true);
    let adjoint = greedy_columns(jt, j, |_| true, heavy);
    Partition { forward, adjoint }
}

/// Partition the entries of `j` into forward and adjoint sweeps.
///
/// Bidirectional search tries every distinct row length as the heavy-row
/// threshold and keeps the split with the fewest sweeps. The result is verified.
pub fn partition(j: &Sparsity, mode: SweepMode) -> Result<Partition> {
    let jt = j.transpose();
    let max_len = (0..j.nrow()).map(|r| j.row(r).len()).max().unwrap_or(0);
    let forward = || split(j, &jt, max_len);
    let adjoint = || split(j, &jt, 0);
    let mixed = || {
        let mut lengths: Vec<usize> = (0..j.nrow()).map(|r| j.row(r).len()).collect();
        lengths.sort_unstable();
        lengths.dedup();
        let mut best: Option<Partition> = None;
        for t in lengths {
            let p = split(j, &jt, t);
            if best.as_ref().map_or(true, |b| p.nsweeps() < b.nsweeps()) {
                best = Some(p);
            }
        }
        best.unwrap_or_else(|| split(j, &jt, 0))
    };

    let p = match mode {
        SweepMode::Forward => forward(),
        SweepMode::Adjoint => adjoint(),
        SweepMode::Bidirectional => mixed(),
        SweepMode::Auto => {
            let mut best = forward();
            for p in [adjoint(), mixed()] {
                if p.nsweeps() < best.nsweeps() {
                    best = p;
                }
            }
            best
        }
    };
    debug!(
        "partition of {} ({:?}): {} forward + {} adjoint sweep(s)",
        j,
        mode,
        p.nfwd(),
        p.nadj()
    );
    verify_partition(j, &p)?;
    Ok(p)
}

/// Distance-2 coloring of a symmetric pattern for Hessian recovery.
///
/// Two vertices conflict when they are adjacent or share a neighbor, so each
/// row has at most one nonzero per color. Vertices with an empty row need no
/// sweep and stay uncolored.
pub fn symmetric_coloring(h: &Sparsity) -> Coloring {
    let n = h.nrow();
    debug_assert_eq!(n, h.ncol());

    let mut adj: Vec<Vec<u32>> = vec![Vec::new(); n];
    for (r, c) in h.iter() {
        if r != c {
            adj[r].push(c as u32);
        }
    }

    let mut adj2: Vec<HashSet<u32>> = vec![HashSet::new(); n];
    for v in 0..n {
        for &u in &adj[v] {
            adj2[v].insert(u);
            for &w in &adj[u as usize] {
                if w as usize != v {
                    adj2[v].insert(w);
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).filter(|&v| !h.row(v).is_empty()).collect();
    order.sort_by(|&a, &b| adj2[b].len().cmp(&adj2[a].len()));

    let mut colors = vec![NONE; n];
    for &v in &order {
        let used: HashSet<u32> = adj2[v]
            .iter()
            .map(|&u| colors[u as usize])
            .filter(|&c| c != NONE)
            .collect();
        let mut color = 0u32;
        while used.contains(&color) {
            color += 1;
        }
        colors[v] = color;
    }

    let coloring = Coloring::new(colors);
    debug!("symmetric coloring of {}: {} color(s)", h, coloring.ncolors);
    coloring
}

/// Check that no row of `j` holds two columns of the same color.
pub fn verify_columns(j: &Sparsity, coloring: &Coloring) -> Result<()> {
    check_rows(j, coloring, |_| true, "verify_columns")
}

/// Check a symmetric coloring: every row has at most one nonzero per color.
pub fn verify_symmetric(h: &Sparsity, coloring: &Coloring) -> Result<()> {
    check_rows(h, coloring, |_| true, "verify_symmetric")
}

/// Check both halves of a partition against `j`.
pub fn verify_partition(j: &Sparsity, p: &Partition) -> Result<()> {
    const OP: &str = "verify_partition";
    check_rows(j, &p.forward, |r| !p.is_adjoint_row(r), OP)?;
    // Adjoint half: within every column, heavy rows must have distinct colors.
    let jt = j.transpose();
    let mut seen = vec![usize::MAX; p.adjoint.ncolors];
    for c in 0..jt.nrow() {
        for &r in jt.row(c) {
            let r = r as usize;
            if let Some(k) = p.adjoint.color(r) {
                if seen[k] == c {
                    return Err(Error::ColoringFailure {
                        op: OP,
                        row: r,
                        col: c,
                        color: k,
                    });
                }
                seen[k] = c;
            }
        }
    }
    Ok(())
}

fn check_rows(
    j: &Sparsity,
    coloring: &Coloring,
    row: impl Fn(usize) -> bool,
    op: &'static str,
) -> Result<()> {
    let mut seen = vec![usize::MAX; coloring.ncolors];
    for r in 0..j.nrow() {
        if !row(r) {
            continue;
        }
        for &c in j.row(r) {
            let c = c as usize;
            let k = coloring.color(c).ok_or(Error::ColoringFailure {
                op,
                row: r,
                col: c,
                color: NONE as usize,
            })?;
            if seen[k] == r {
                return Err(Error::ColoringFailure {
                    op,
                    row: r,
                    col: c,
                    color: k,
                });
            }
            seen[k] = r;
        }
    }
    Ok(())
}
