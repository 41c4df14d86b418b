//! Sparsity detection and colored Jacobian / Hessian assembly.
//!
//! Jacobian rows index the nonzeros of one output and columns the nonzeros of
//! one input. Patterns are found by propagating 64-bit dependency words
//! through the tape; numeric values by one sweep per color followed by a pure
//! scatter into the pattern.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use log::{debug, trace};

use crate::coloring::{partition, symmetric_coloring, verify_symmetric, Coloring, Partition};
use crate::error::{DimensionError, Error, Result};
use crate::float::Float;
use crate::matrix::SparseMatrix;
use crate::sparsity::Sparsity;

use super::memory::{Memory, MemorySizes};
use super::Instr;

/// Pattern and coloring for repeated Jacobian evaluation of one block.
///
/// Built once by [`CompiledFunction::jacobian_plan`](super::CompiledFunction::jacobian_plan)
/// and reusable across inputs and threads.
#[derive(Clone, Debug, PartialEq)]
pub struct JacobianPlan {
    pub(crate) oind: usize,
    pub(crate) iind: usize,
    pub(crate) sparsity: Arc<Sparsity>,
    pub(crate) partition: Partition,
}

impl JacobianPlan {
    pub fn output(&self) -> usize {
        self.oind
    }

    pub fn input(&self) -> usize {
        self.iind
    }

    /// Jacobian pattern, output nonzeros × input nonzeros.
    pub fn sparsity(&self) -> &Arc<Sparsity> {
        &self.sparsity
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Number of directional sweeps per evaluation.
    pub fn nsweeps(&self) -> usize {
        self.partition.nsweeps()
    }
}

/// Pattern and symmetric coloring for repeated Hessian evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct HessianPlan {
    pub(crate) oind: usize,
    pub(crate) iind: usize,
    pub(crate) sparsity: Arc<Sparsity>,
    pub(crate) coloring: Coloring,
}

impl HessianPlan {
    pub fn output(&self) -> usize {
        self.oind
    }

    pub fn input(&self) -> usize {
        self.iind
    }

    /// Symmetric pattern, input nonzeros × input nonzeros.
    pub fn sparsity(&self) -> &Arc<Sparsity> {
        &self.sparsity
    }

    pub fn coloring(&self) -> &Coloring {
        &self.coloring
    }

    /// Number of forward-over-adjoint sweeps per evaluation.
    pub fn nsweeps(&self) -> usize {
        self.coloring.ncolors()
    }
}

/// Split `0..n` into consecutive ranges of at most `batch` colors.
pub(crate) fn batches(n: usize, batch: usize) -> Vec<Range<usize>> {
    (0..n)
        .step_by(batch.max(1))
        .map(|s| s..(s + batch).min(n))
        .collect()
}

/// Color `color` of the `plan`-th Jacobian plan in a multi-block sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Direction {
    plan: usize,
    color: usize,
}

/// Every color of every plan, plans in order.
fn directions(ncolors: impl Iterator<Item = usize>) -> Vec<Direction> {
    ncolors
        .enumerate()
        .flat_map(|(plan, n)| (0..n).map(move |color| Direction { plan, color }))
        .collect()
}

/// Sweep direction holding each color of `plan`, or `None` if the batch
/// holds none of them.
fn direction_slots(dirs: &[Direction], plan: usize, ncolors: usize) -> Option<Vec<Option<usize>>> {
    let mut slots = vec![None; ncolors];
    let mut any = false;
    for (d, dir) in dirs.iter().enumerate() {
        if dir.plan == plan {
            slots[dir.color] = Some(d);
            any = true;
        }
    }
    any.then_some(slots)
}

impl<F: Float> super::CompiledFunction<F> {
    /// Structural Jacobian of output `oind` with respect to input `iind`.
    ///
    /// No numeric evaluation takes place. Zero-derivative operations (`sign`,
    /// `floor`, `ceil`) and the condition of `if_else` carry no dependency.
    pub fn jacobian_sparsity(&self, oind: usize, iind: usize) -> Result<Sparsity> {
        const OP: &str = "jacobian_sparsity";
        self.check_output_index(OP, oind)?;
        self.check_input_index(OP, iind)?;
        let nin = self.input_sparsity[iind].nnz();
        let nout = self.output_sparsity[oind].nnz();
        let sp = if nin.div_ceil(64) <= nout.div_ceil(64) {
            self.jacobian_sparsity_fwd(oind, iind)
        } else {
            self.jacobian_sparsity_adj(oind, iind)
        };
        debug!("jacobian sparsity of output {oind} / input {iind}: {sp}");
        Ok(sp)
    }

    fn jacobian_sparsity_fwd(&self, oind: usize, iind: usize) -> Sparsity {
        let layout = &self.full;
        let nin = self.input_sparsity[iind].nnz();
        let nout = self.output_sparsity[oind].nnz();
        let in_off = layout.offset(self.inputs[iind]);
        let out_off = layout.offset(self.outputs[oind]);
        let mut rows: Vec<Vec<u32>> = vec![Vec::new(); nout];
        let mut bits = vec![0u64; layout.size];

        for start in (0..nin).step_by(64) {
            let end = (start + 64).min(nin);
            bits.fill(0);
            for c in start..end {
                bits[in_off + c] = 1u64 << (c - start);
            }
            for (i, el) in self.elements.iter().enumerate() {
                let o = layout.offset(i);
                let arg = |j: usize| layout.offset(el.args[j]);
                for k in 0..el.nnz {
                    let w = match &el.instr {
                        Instr::Input(_) => continue,
                        Instr::Constant(_) => 0,
                        Instr::Unary { op, a } => {
                            if op.has_zero_derivative() {
                                0
                            } else {
                                a.slot(arg(0), k).map_or(0, |s| bits[s])
                            }
                        }
                        Instr::Binary { a, b, .. } => {
                            a.slot(arg(0), k).map_or(0, |s| bits[s]) | b.slot(arg(1), k).map_or(0, |s| bits[s])
                        }
                        Instr::IfElse { .. } => bits[arg(1) + k],
                        Instr::Gather { map, .. } => {
                            let (d, nz) = map[k];
                            bits[arg(d as usize) + nz as usize]
                        }
                    };
                    bits[o + k] = w;
                }
            }
            for (r, row) in rows.iter_mut().enumerate() {
                let w = bits[out_off + r];
                row.extend(extract_bits(&[w], 64).into_iter().map(|b| b + start as u32));
            }
        }
        Sparsity::from_rows(nin, rows)
    }

    fn jacobian_sparsity_adj(&self, oind: usize, iind: usize) -> Sparsity {
        let layout = &self.full;
        let nin = self.input_sparsity[iind].nnz();
        let nout = self.output_sparsity[oind].nnz();
        let in_off = layout.offset(self.inputs[iind]);
        let out_off = layout.offset(self.outputs[oind]);
        // Rows of the transpose: output nonzeros reaching each input nonzero.
        let mut cols: Vec<Vec<u32>> = vec![Vec::new(); nin];
        let mut bits = vec![0u64; layout.size];

        for start in (0..nout).step_by(64) {
            let end = (start + 64).min(nout);
            bits.fill(0);
            for r in start..end {
                bits[out_off + r] |= 1u64 << (r - start);
            }
            for (i, el) in self.elements.iter().enumerate().rev() {
                let o = layout.offset(i);
                let arg = |j: usize| layout.offset(el.args[j]);
                for k in 0..el.nnz {
                    let w = bits[o + k];
                    if w == 0 {
                        continue;
                    }
                    match &el.instr {
                        Instr::Input(_) | Instr::Constant(_) => {}
                        Instr::Unary { op, a } => {
                            if !op.has_zero_derivative() {
                                if let Some(s) = a.slot(arg(0), k) {
                                    bits[s] |= w;
                                }
                            }
                        }
                        Instr::Binary { a, b, .. } => {
                            if let Some(s) = a.slot(arg(0), k) {
                                bits[s] |= w;
                            }
                            if let Some(s) = b.slot(arg(1), k) {
                                bits[s] |= w;
                            }
                        }
                        Instr::IfElse { .. } => bits[arg(1) + k] |= w,
                        Instr::Gather { map, .. } => {
                            let (d, nz) = map[k];
                            bits[arg(d as usize) + nz as usize] |= w;
                        }
                    }
                }
            }
            for (c, col) in cols.iter_mut().enumerate() {
                let w = bits[in_off + c];
                col.extend(extract_bits(&[w], 64).into_iter().map(|b| b + start as u32));
            }
        }
        Sparsity::from_rows(nout, cols).transpose()
    }

    /// Structural Hessian of scalar output `oind` with respect to input `iind`.
    ///
    /// Second-order interactions are marked only where the element lies in
    /// the cone of the output. The result is symmetric.
    pub fn hessian_sparsity(&self, oind: usize, iind: usize) -> Result<Sparsity> {
        const OP: &str = "hessian_sparsity";
        self.check_output_index(OP, oind)?;
        self.check_input_index(OP, iind)?;
        self.check_scalar_output(OP, oind)?;

        let layout = &self.full;
        let n = self.input_sparsity[iind].nnz();
        let nwords = n.div_ceil(64).max(1);

        // Slots with a structurally nonzero adjoint.
        let mut live = vec![false; layout.size];
        live[layout.offset(self.outputs[oind])] = true;
        for (i, el) in self.elements.iter().enumerate().rev() {
            let o = layout.offset(i);
            let arg = |j: usize| layout.offset(el.args[j]);
            for k in 0..el.nnz {
                if !live[o + k] {
                    continue;
                }
                match &el.instr {
                    Instr::Input(_) | Instr::Constant(_) => {}
                    Instr::Unary { op, a } => {
                        if !op.has_zero_derivative() {
                            if let Some(s) = a.slot(arg(0), k) {
                                live[s] = true;
                            }
                        }
                    }
                    Instr::Binary { a, b, .. } => {
                        for s in [a.slot(arg(0), k), b.slot(arg(1), k)].into_iter().flatten() {
                            live[s] = true;
                        }
                    }
                    Instr::IfElse { .. } => live[arg(1) + k] = true,
                    Instr::Gather { map, .. } => {
                        let (d, nz) = map[k];
                        live[arg(d as usize) + nz as usize] = true;
                    }
                }
            }
        }

        // Input nonzeros each slot depends on.
        let mut deps = vec![0u64; layout.size * nwords];
        let in_off = layout.offset(self.inputs[iind]);
        for c in 0..n {
            deps[(in_off + c) * nwords + c / 64] |= 1u64 << (c % 64);
        }
        let mut interactions: HashSet<(u32, u32)> = HashSet::new();
        let mut da = vec![0u64; nwords];
        let mut db = vec![0u64; nwords];

        for (i, el) in self.elements.iter().enumerate() {
            let o = layout.offset(i);
            let arg = |j: usize| layout.offset(el.args[j]);
            for k in 0..el.nnz {
                da.fill(0);
                db.fill(0);
                let load = |dst: &mut [u64], slot: Option<usize>| {
                    if let Some(s) = slot {
                        dst.copy_from_slice(&deps[s * nwords..(s + 1) * nwords]);
                    }
                };
                match &el.instr {
                    Instr::Input(_) => continue,
                    Instr::Constant(_) => {}
                    Instr::Unary { op, a } => {
                        if !op.has_zero_derivative() {
                            let slot = a.slot(arg(0), k);
                            load(&mut da, slot);
                            if live[o + k] && op.is_nonlinear() {
                                mark_all_pairs(&da, n, &mut interactions);
                            }
                        }
                    }
                    Instr::Binary { op, a, b } => {
                        load(&mut da, a.slot(arg(0), k));
                        load(&mut db, b.slot(arg(1), k));
                        if live[o + k] {
                            let so = op.second_order();
                            if so.aa {
                                mark_all_pairs(&da, n, &mut interactions);
                            }
                            if so.bb {
                                mark_all_pairs(&db, n, &mut interactions);
                            }
                            if so.ab {
                                mark_cross_pairs(&da, &db, n, &mut interactions);
                            }
                        }
                        for (x, y) in da.iter_mut().zip(&db) {
                            *x |= y;
                        }
                    }
                    Instr::IfElse { .. } => load(&mut da, Some(arg(1) + k)),
                    Instr::Gather { map, .. } => {
                        let (d, nz) = map[k];
                        load(&mut da, Some(arg(d as usize) + nz as usize));
                    }
                }
                deps[(o + k) * nwords..(o + k + 1) * nwords].copy_from_slice(&da);
            }
        }

        let mut rows: Vec<Vec<u32>> = vec![Vec::new(); n];
        for &(r, c) in &interactions {
            rows[r as usize].push(c);
            if r != c {
                rows[c as usize].push(r);
            }
        }
        for row in &mut rows {
            row.sort_unstable();
        }
        let sp = Sparsity::from_rows(n, rows);
        debug!("hessian sparsity of output {oind} / input {iind}: {sp}");
        Ok(sp)
    }

    /// Pattern and verified partition for the Jacobian block `(oind, iind)`.
    pub fn jacobian_plan(&self, oind: usize, iind: usize) -> Result<JacobianPlan> {
        let sparsity = Arc::new(self.jacobian_sparsity(oind, iind)?);
        let partition = partition(&sparsity, self.config.mode)?;
        debug!(
            "jacobian plan ({oind}, {iind}): {} forward + {} adjoint sweep(s) for {} nonzero(s)",
            partition.nfwd(),
            partition.nadj(),
            sparsity.nnz()
        );
        Ok(JacobianPlan {
            oind,
            iind,
            sparsity,
            partition,
        })
    }

    /// Pattern and verified symmetric coloring for the Hessian block `(oind, iind)`.
    pub fn hessian_plan(&self, oind: usize, iind: usize) -> Result<HessianPlan> {
        let sparsity = Arc::new(self.hessian_sparsity(oind, iind)?);
        let coloring = symmetric_coloring(&sparsity);
        verify_symmetric(&sparsity, &coloring)?;
        debug!(
            "hessian plan ({oind}, {iind}): {} sweep(s) for {} nonzero(s)",
            coloring.ncolors(),
            sparsity.nnz()
        );
        Ok(HessianPlan {
            oind,
            iind,
            sparsity,
            coloring,
        })
    }

    /// Sparse Jacobian of output `oind` with respect to input `iind`.
    ///
    /// Builds a [`JacobianPlan`] on every call; cache the plan and use
    /// [`jacobian_with_plan`](Self::jacobian_with_plan) for repeated
    /// evaluation.
    pub fn jacobian(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        oind: usize,
        iind: usize,
    ) -> Result<SparseMatrix<F>> {
        let plan = self.jacobian_plan(oind, iind)?;
        self.jacobian_with_plan(mem, inputs, &plan)
    }

    /// Sparse Jacobian from a precomputed plan.
    ///
    /// Up to `max_directions` colors share one sweep, further limited by the
    /// directions `mem` holds. `mem` needs the full work size when the plan
    /// has adjoint colors.
    pub fn jacobian_with_plan(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        plan: &JacobianPlan,
    ) -> Result<SparseMatrix<F>> {
        const OP: &str = "jacobian";
        self.check_jacobian_plan(OP, plan)?;
        self.check_inputs(OP, inputs)?;
        mem.check(OP, self.jacobian_memory(plan))?;

        let mut jac = SparseMatrix::zeros(Arc::clone(&plan.sparsity));
        let fwd_batch = self.config.max_directions.min(mem.nfwd());
        for range in batches(plan.partition.nfwd(), fwd_batch) {
            self.jacobian_fwd_batch(mem, inputs, plan, range, jac.values_mut())?;
        }
        if plan.partition.nadj() > 0 {
            self.load_values_full(mem, inputs, OP)?;
            let adj_batch = self.config.max_directions.min(mem.nadj());
            for range in batches(plan.partition.nadj(), adj_batch) {
                self.jacobian_adj_batch(mem, plan, range, jac.values_mut())?;
            }
        }
        Ok(jac)
    }

    /// Sparse Jacobians of several `(oind, iind)` blocks in one evaluation.
    ///
    /// Builds a plan per block; see
    /// [`jacobian_blocks_with_plans`](Self::jacobian_blocks_with_plans).
    pub fn jacobian_blocks(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        blocks: &[(usize, usize)],
    ) -> Result<Vec<SparseMatrix<F>>> {
        let plans = blocks
            .iter()
            .map(|&(oind, iind)| self.jacobian_plan(oind, iind))
            .collect::<Result<Vec<_>>>()?;
        self.jacobian_blocks_with_plans(mem, inputs, &plans)
    }

    /// Sparse Jacobians of several blocks from precomputed plans.
    ///
    /// The forward colors of all plans are packed into shared sweeps of up to
    /// `max_directions` directions, and likewise the adjoint colors, which all
    /// run against a single value pass. Results come back in plan order.
    pub fn jacobian_blocks_with_plans(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        plans: &[JacobianPlan],
    ) -> Result<Vec<SparseMatrix<F>>> {
        const OP: &str = "jacobian_blocks";
        for plan in plans {
            self.check_jacobian_plan(OP, plan)?;
        }
        self.check_inputs(OP, inputs)?;
        let fwd = directions(plans.iter().map(|p| p.partition.nfwd()));
        let adj = directions(plans.iter().map(|p| p.partition.nadj()));
        let needed = MemorySizes {
            work: self.layout(adj.len().min(1)).size,
            nfwd: fwd.len().min(1),
            nadj: adj.len().min(1),
        };
        mem.check(OP, needed)?;

        let refs: Vec<&JacobianPlan> = plans.iter().collect();
        let mut jacs: Vec<SparseMatrix<F>> = plans
            .iter()
            .map(|p| SparseMatrix::zeros(Arc::clone(&p.sparsity)))
            .collect();
        debug!(
            "jacobian of {} block(s): {} forward + {} adjoint direction(s)",
            plans.len(),
            fwd.len(),
            adj.len()
        );

        let fwd_batch = self.config.max_directions.min(mem.nfwd());
        for range in batches(fwd.len(), fwd_batch) {
            trace!("jacobian blocks forward batch {range:?}");
            let mut outs: Vec<&mut [F]> = jacs.iter_mut().map(|j| j.values_mut()).collect();
            self.jacobian_fwd_directions(mem, inputs, &refs, &fwd[range], &mut outs)?;
        }
        if !adj.is_empty() {
            self.load_values_full(mem, inputs, OP)?;
            let adj_batch = self.config.max_directions.min(mem.nadj());
            for range in batches(adj.len(), adj_batch) {
                trace!("jacobian blocks adjoint batch {range:?}");
                let mut outs: Vec<&mut [F]> = jacs.iter_mut().map(|j| j.values_mut()).collect();
                self.jacobian_adj_directions(mem, &refs, &adj[range], &mut outs)?;
            }
        }
        Ok(jacs)
    }

    /// Sparse Hessian of scalar output `oind` with respect to input `iind`.
    pub fn hessian(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        oind: usize,
        iind: usize,
    ) -> Result<SparseMatrix<F>> {
        let plan = self.hessian_plan(oind, iind)?;
        self.hessian_with_plan(mem, inputs, &plan)
    }

    /// Sparse Hessian from a precomputed plan.
    ///
    /// `mem` needs the full work size, at least one adjoint direction and at
    /// least one forward direction when the pattern is nonempty.
    pub fn hessian_with_plan(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        plan: &HessianPlan,
    ) -> Result<SparseMatrix<F>> {
        const OP: &str = "hessian";
        self.check_hessian_plan(OP, plan)?;
        self.check_inputs(OP, inputs)?;
        mem.check(OP, self.hessian_memory(plan))?;

        let mut hess = SparseMatrix::zeros(Arc::clone(&plan.sparsity));
        let batch = self.config.max_directions.min(mem.nfwd());
        for range in batches(plan.coloring.ncolors(), batch) {
            self.hessian_batch(mem, inputs, plan, range, hess.values_mut())?;
        }
        Ok(hess)
    }

    /// Smallest memory that evaluates `plan`, one direction per sweep.
    pub(crate) fn jacobian_memory(&self, plan: &JacobianPlan) -> MemorySizes {
        let (nfwd, nadj) = (plan.partition.nfwd().min(1), plan.partition.nadj().min(1));
        MemorySizes {
            work: self.layout(nadj).size,
            nfwd,
            nadj,
        }
    }

    pub(crate) fn hessian_memory(&self, plan: &HessianPlan) -> MemorySizes {
        MemorySizes {
            work: self.full.size,
            nfwd: plan.coloring.ncolors().min(1),
            nadj: 1,
        }
    }

    pub(crate) fn check_jacobian_plan(&self, op: &'static str, plan: &JacobianPlan) -> Result<()> {
        self.check_output_index(op, plan.oind)?;
        self.check_input_index(op, plan.iind)?;
        let expected = (
            self.output_sparsity[plan.oind].nnz(),
            self.input_sparsity[plan.iind].nnz(),
        );
        self.check_plan_shape(op, expected, plan.sparsity.shape())
    }

    pub(crate) fn check_hessian_plan(&self, op: &'static str, plan: &HessianPlan) -> Result<()> {
        self.check_output_index(op, plan.oind)?;
        self.check_input_index(op, plan.iind)?;
        self.check_scalar_output(op, plan.oind)?;
        let n = self.input_sparsity[plan.iind].nnz();
        self.check_plan_shape(op, (n, n), plan.sparsity.shape())
    }

    fn check_plan_shape(&self, op: &'static str, expected: (usize, usize), got: (usize, usize)) -> Result<()> {
        if expected.0 != got.0 {
            return Err(Error::mismatch(op, "plan rows", expected.0, got.0));
        }
        if expected.1 != got.1 {
            return Err(Error::mismatch(op, "plan columns", expected.1, got.1));
        }
        Ok(())
    }

    fn check_scalar_output(&self, op: &'static str, oind: usize) -> Result<()> {
        let sp = &self.output_sparsity[oind];
        if sp.is_dense_scalar() {
            Ok(())
        } else {
            Err(Error::dimension(
                op,
                DimensionError::NotScalar {
                    index: oind,
                    nrow: sp.nrow(),
                    ncol: sp.ncol(),
                    nnz: sp.nnz(),
                },
            ))
        }
    }

    /// Value pass over the full layout, ahead of adjoint sweeps.
    pub(crate) fn load_values_full(&self, mem: &mut Memory<F>, inputs: &[Vec<F>], op: &'static str) -> Result<()> {
        self.load_inputs(&mut mem.values, &self.full, inputs);
        self.sweep_forward(mem, &self.full, 0, op)
    }

    /// Forward sweeps for colors `range`; scatters into the Jacobian values.
    pub(crate) fn jacobian_fwd_batch(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        plan: &JacobianPlan,
        range: Range<usize>,
        out: &mut [F],
    ) -> Result<()> {
        trace!("jacobian forward batch {range:?}");
        let dirs: Vec<Direction> = range.map(|color| Direction { plan: 0, color }).collect();
        self.jacobian_fwd_directions(mem, inputs, &[plan], &dirs, &mut [out])
    }

    /// Adjoint sweeps for colors `range`. Values must already be loaded by
    /// [`load_values_full`](Self::load_values_full).
    pub(crate) fn jacobian_adj_batch(
        &self,
        mem: &mut Memory<F>,
        plan: &JacobianPlan,
        range: Range<usize>,
        out: &mut [F],
    ) -> Result<()> {
        trace!("jacobian adjoint batch {range:?}");
        let dirs: Vec<Direction> = range.map(|color| Direction { plan: 0, color }).collect();
        self.jacobian_adj_directions(mem, &[plan], &dirs, &mut [out])
    }

    /// One forward sweep carrying direction `d` for every `dirs[d]`, each
    /// seeded on its own plan's input. Scatters into `outs[plan]`.
    fn jacobian_fwd_directions(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        plans: &[&JacobianPlan],
        dirs: &[Direction],
        outs: &mut [&mut [F]],
    ) -> Result<()> {
        let layout = self.layout(0);
        self.load_inputs(&mut mem.values, layout, inputs);
        for (d, dir) in dirs.iter().enumerate() {
            let plan = plans[dir.plan];
            let coloring = plan.partition.forward();
            self.load_tangents(mem, layout, d, |i, k| {
                if i == plan.iind && coloring.color(k) == Some(dir.color) {
                    F::one()
                } else {
                    F::zero()
                }
            });
        }
        self.sweep_forward(mem, layout, dirs.len(), "jacobian")?;

        for (p, (plan, out)) in plans.iter().zip(outs.iter_mut()).enumerate() {
            let Some(slots) = direction_slots(dirs, p, plan.partition.nfwd()) else {
                continue;
            };
            let coloring = plan.partition.forward();
            let out_off = layout.offset(self.outputs[plan.oind]);
            let sp = &plan.sparsity;
            for r in 0..sp.nrow() {
                if plan.partition.is_adjoint_row(r) {
                    continue;
                }
                for q in sp.row_ptr()[r]..sp.row_ptr()[r + 1] {
                    let c = sp.col_indices()[q] as usize;
                    if let Some(d) = coloring.color(c).and_then(|k| slots[k]) {
                        out[q] = mem.fwd[d][out_off + r];
                    }
                }
            }
        }
        Ok(())
    }

    /// One adjoint sweep carrying direction `d` for every `dirs[d]`, each
    /// seeded on its own plan's output. Values must already be loaded.
    fn jacobian_adj_directions(
        &self,
        mem: &mut Memory<F>,
        plans: &[&JacobianPlan],
        dirs: &[Direction],
        outs: &mut [&mut [F]],
    ) -> Result<()> {
        for (d, dir) in dirs.iter().enumerate() {
            let plan = plans[dir.plan];
            let coloring = plan.partition.adjoint();
            Self::clear_adjoint(mem, d);
            self.seed_adjoint(mem, d, plan.oind, |r| {
                if coloring.color(r) == Some(dir.color) {
                    F::one()
                } else {
                    F::zero()
                }
            });
        }
        self.sweep_adjoint(mem, dirs.len(), "jacobian")?;
        let sens: Vec<Vec<F>> = dirs
            .iter()
            .enumerate()
            .map(|(d, dir)| self.take_input_adjoint(mem, d, plans[dir.plan].iind))
            .collect();

        for (p, (plan, out)) in plans.iter().zip(outs.iter_mut()).enumerate() {
            let Some(slots) = direction_slots(dirs, p, plan.partition.nadj()) else {
                continue;
            };
            let coloring = plan.partition.adjoint();
            let sp = &plan.sparsity;
            for r in 0..sp.nrow() {
                let Some(d) = coloring.color(r).and_then(|k| slots[k]) else {
                    continue;
                };
                for q in sp.row_ptr()[r]..sp.row_ptr()[r + 1] {
                    let c = sp.col_indices()[q] as usize;
                    out[q] = sens[d][c];
                }
            }
        }
        Ok(())
    }

    /// Forward-over-adjoint sweeps for colors `range`.
    pub(crate) fn hessian_batch(
        &self,
        mem: &mut Memory<F>,
        inputs: &[Vec<F>],
        plan: &HessianPlan,
        range: Range<usize>,
        out: &mut [F],
    ) -> Result<()> {
        trace!("hessian batch {range:?}");
        let coloring = &plan.coloring;
        let layout = &self.full;
        let nd = range.len();
        self.load_inputs(&mut mem.values, layout, inputs);
        for d in 0..nd {
            let color = range.start + d;
            self.load_tangents(mem, layout, d, |i, k| {
                if i == plan.iind && coloring.color(k) == Some(color) {
                    F::one()
                } else {
                    F::zero()
                }
            });
            mem.adj_fwd[d].fill(F::zero());
        }
        self.sweep_forward(mem, layout, nd, "hessian")?;
        Self::clear_adjoint(mem, 0);
        self.seed_adjoint(mem, 0, plan.oind, |_| F::one());
        self.sweep_second_order(mem, nd, "hessian")?;
        let hv: Vec<Vec<F>> = (0..nd)
            .map(|d| self.take_input_adjoint_tangent(mem, d, plan.iind))
            .collect();

        let sp = &plan.sparsity;
        for r in 0..sp.nrow() {
            for p in sp.row_ptr()[r]..sp.row_ptr()[r + 1] {
                let c = sp.col_indices()[p] as usize;
                if let Some(color) = coloring.color(c).filter(|k| range.contains(k)) {
                    out[p] = hv[color - range.start][r];
                }
            }
        }
        Ok(())
    }
}

/// Mark every pair `(i, j)`, `i >= j`, of the dependency set.
fn mark_all_pairs(deps: &[u64], n: usize, interactions: &mut HashSet<(u32, u32)>) {
    let bits = extract_bits(deps, n);
    for (i, &a) in bits.iter().enumerate() {
        for &b in &bits[..=i] {
            interactions.insert((a.max(b), a.min(b)));
        }
    }
}

/// Mark every cross pair between two dependency sets.
fn mark_cross_pairs(deps_a: &[u64], deps_b: &[u64], n: usize, interactions: &mut HashSet<(u32, u32)>) {
    let bits_a = extract_bits(deps_a, n);
    let bits_b = extract_bits(deps_b, n);
    for &a in &bits_a {
        for &b in &bits_b {
            interactions.insert((a.max(b), a.min(b)));
        }
    }
}

/// Positions of the set bits, below `max_bits`.
fn extract_bits(bitset: &[u64], max_bits: usize) -> Vec<u32> {
    let mut result = Vec::new();
    for (word_idx, &word) in bitset.iter().enumerate() {
        let mut w = word;
        while w != 0 {
            let pos = word_idx * 64 + w.trailing_zeros() as usize;
            if pos < max_bits {
                result.push(pos as u32);
            }
            w &= w - 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_cover_range() {
        assert_eq!(batches(7, 3), vec![0..3, 3..6, 6..7]);
        assert_eq!(batches(0, 3), Vec::<Range<usize>>::new());
        assert_eq!(batches(2, 8), vec![0..2]);
    }

    #[test]
    fn extract_bits_across_words() {
        let bits = [0b101u64, 1u64 << 3];
        assert_eq!(extract_bits(&bits, 128), vec![0, 2, 67]);
        assert_eq!(extract_bits(&bits, 2), vec![0]);
    }
}
