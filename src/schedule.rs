// Splitting the plan into batch-width chunks.

use std::ops::Range;

use crate::core::{EvalError, Result};
use crate::plan::{InitialCondition, InitialConditionPlan};

/// One batch-width execution covering `start..end` of the plan.
///
/// `slot_conditions` always holds exactly one condition per slot. When the
/// plan runs out, the trailing slots repeat `plan[0]`; those padding slots are
/// executed but never read back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the schedule.
    pub index: usize,
    pub start: usize,
    pub end: usize,
    slot_conditions: Vec<InitialCondition>,
}

impl Chunk {
    /// Number of slots carrying a real condition.
    pub fn valid_count(&self) -> usize { self.end - self.start }

    /// Batch width.
    pub fn width(&self) -> usize { self.slot_conditions.len() }

    pub fn slot_conditions(&self) -> &[InitialCondition] { &self.slot_conditions }

    /// Slots whose results belong to real conditions.
    pub fn valid_slots(&self) -> Range<usize> { 0..self.valid_count() }

    /// Plan range covered by this chunk.
    pub fn global_range(&self) -> Range<usize> { self.start..self.end }

    pub fn padding_count(&self) -> usize { self.width() - self.valid_count() }
}

/// Produces `ceil(M / N)` chunks covering the plan in order.
#[derive(Clone, Debug)]
pub struct ChunkScheduler<'a> {
    plan: &'a InitialConditionPlan,
    n_envs: usize,
}

impl<'a> ChunkScheduler<'a> {
    /// Fails with a configuration error when the width is zero or the plan is empty.
    pub fn new(plan: &'a InitialConditionPlan, n_envs: usize) -> Result<Self> {
        if n_envs == 0 {
            return Err(EvalError::Config("batch width must be at least 1".into()));
        }
        if plan.is_empty() {
            return Err(EvalError::Config("no initial conditions to evaluate".into()));
        }
        Ok(Self { plan, n_envs })
    }

    pub fn n_envs(&self) -> usize { self.n_envs }

    pub fn n_chunks(&self) -> usize { self.plan.len().div_ceil(self.n_envs) }

    /// The `k`-th chunk, or `None` past the end of the schedule.
    pub fn chunk(&self, k: usize) -> Option<Chunk> {
        if k >= self.n_chunks() {
            return None;
        }
        let conditions = self.plan.conditions();
        let start = k * self.n_envs;
        let end = conditions.len().min(start + self.n_envs);
        let mut slot_conditions = conditions[start..end].to_vec();
        slot_conditions.resize(self.n_envs, conditions[0].clone());
        Some(Chunk { index: k, start, end, slot_conditions })
    }

    pub fn iter(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.n_chunks()).filter_map(move |k| self.chunk(k))
    }
}
