// Folding chunk results back into per-condition results.
//
// Only the first `valid_count` slots of a chunk ever reach the
// `ResultTable`; the slot-indexed diagnostic stream takes every slot.

use std::path::PathBuf;

use ndarray::{Array4, ArrayView3, Axis};

use crate::core::{EvalError, Result};
use crate::plan::{Group, InitialConditionPlan};
use crate::rollout::SlotState;
use crate::schedule::Chunk;

/// Per-condition results, written exactly once per plan index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultTable {
    max_rewards: Vec<Option<f32>>,
    videos: Vec<Option<PathBuf>>,
}

impl ResultTable {
    pub fn new(n_inits: usize) -> Self {
        Self { max_rewards: vec![None; n_inits], videos: vec![None; n_inits] }
    }

    /// Writes the valid slots of `chunk` to their plan indices.
    ///
    /// `slots` must hold one state per physical slot. Padding slots are never
    /// read. On error the table is left unchanged.
    pub fn ingest(&mut self, chunk: &Chunk, slots: &[SlotState]) -> Result<()> {
        if chunk.end > self.max_rewards.len() {
            return Err(EvalError::ChunkOutOfRange {
                start: chunk.start,
                end: chunk.end,
                len: self.max_rewards.len(),
            });
        }
        if slots.len() != chunk.width() {
            return Err(EvalError::Aggregation {
                start: chunk.start,
                expected: chunk.width(),
                actual: slots.len(),
            });
        }
        let valid = &slots[chunk.valid_slots()];
        let mut rows = Vec::with_capacity(valid.len());
        for (index, slot) in chunk.global_range().zip(valid) {
            if self.max_rewards[index].is_some() {
                return Err(EvalError::DuplicateResult(index));
            }
            let max_reward = slot.max_reward().ok_or_else(|| {
                EvalError::Rollout(format!("condition {} produced an empty reward trace", index))
            })?;
            rows.push((index, max_reward, &slot.video));
        }
        for (index, max_reward, video) in rows {
            self.max_rewards[index] = Some(max_reward);
            self.videos[index] = video.clone();
        }
        Ok(())
    }

    pub fn len(&self) -> usize { self.max_rewards.len() }

    pub fn is_empty(&self) -> bool { self.max_rewards.is_empty() }

    pub fn max_reward(&self, index: usize) -> Option<f32> { self.max_rewards.get(index).copied().flatten() }

    pub fn video(&self, index: usize) -> Option<&PathBuf> { self.videos.get(index).and_then(|v| v.as_ref()) }

    /// Whether every index has been written.
    pub fn is_complete(&self) -> bool { self.max_rewards.iter().all(Option::is_some) }
}

/// One line of the per-condition report.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionRecord {
    pub index: usize,
    pub group: Group,
    pub seed: u64,
    pub max_reward: f32,
    pub video: Option<PathBuf>,
}

/// Mean of the max rewards of one group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupScore {
    pub group: Group,
    pub mean_score: f32,
}

/// Predicted frames of one physical slot across all chunks, as 8-bit video `(T, H, W, C)`.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotVideo {
    pub slot: usize,
    pub frames: Array4<u8>,
}

/// Final result of an evaluation run.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalReport {
    /// One record per condition, in plan order.
    pub conditions: Vec<ConditionRecord>,
    /// One score per non-empty group, in plan order.
    pub groups: Vec<GroupScore>,
    /// Slot-indexed diagnostic stream. Frames of different conditions are
    /// spliced together when a slot served several chunks.
    pub slot_videos: Vec<SlotVideo>,
}

impl EvalReport {
    pub fn mean_score(&self, group: Group) -> Option<f32> {
        self.groups.iter().find(|g| g.group == group).map(|g| g.mean_score)
    }
}

/// Accumulates chunk results over a run.
#[derive(Debug)]
pub struct ResultAggregator<'a> {
    plan: &'a InitialConditionPlan,
    table: ResultTable,
    diagnostics: Vec<Vec<ndarray::Array3<f32>>>,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(plan: &'a InitialConditionPlan, n_envs: usize) -> Self {
        Self {
            plan,
            table: ResultTable::new(plan.len()),
            diagnostics: vec![Vec::new(); n_envs],
        }
    }

    pub fn table(&self) -> &ResultTable { &self.table }

    /// Records the valid slots of `chunk` and appends every slot's predicted
    /// frames to its diagnostic stream.
    pub fn ingest(&mut self, chunk: &Chunk, slots: &[SlotState]) -> Result<()> {
        self.table.ingest(chunk, slots)?;
        for (stream, slot) in self.diagnostics.iter_mut().zip(slots) {
            stream.extend(slot.predicted_frames.iter().cloned());
        }
        Ok(())
    }

    /// Builds the report once every condition has been recorded.
    pub fn finalize(self) -> Result<EvalReport> {
        let mut conditions = Vec::with_capacity(self.plan.len());
        for c in self.plan.iter() {
            let max_reward = self.table.max_reward(c.index).ok_or(EvalError::Aggregation {
                start: c.index,
                expected: 1,
                actual: 0,
            })?;
            conditions.push(ConditionRecord {
                index: c.index,
                group: c.group,
                seed: c.seed,
                max_reward,
                video: self.table.video(c.index).cloned(),
            });
        }

        let groups = self
            .plan
            .groups()
            .into_iter()
            .map(|group| {
                let scores: Vec<f64> = conditions
                    .iter()
                    .filter(|r| r.group == group)
                    .map(|r| r.max_reward as f64)
                    .collect();
                let mean_score = (scores.iter().sum::<f64>() / scores.len() as f64) as f32;
                GroupScore { group, mean_score }
            })
            .collect();

        let mut slot_videos = Vec::new();
        for (slot, frames) in self.diagnostics.iter().enumerate() {
            if let Some(frames) = to_video(frames)? {
                slot_videos.push(SlotVideo { slot, frames });
            }
        }

        Ok(EvalReport { conditions, groups, slot_videos })
    }
}

/// Stacks `(H, W, C)` frames in `[0, 1]` into an 8-bit `(T, H, W, C)` video.
fn to_video(frames: &[ndarray::Array3<f32>]) -> Result<Option<Array4<u8>>> {
    if frames.is_empty() {
        return Ok(None);
    }
    let views: Vec<ArrayView3<f32>> = frames.iter().map(|f| f.view()).collect();
    let stacked = ndarray::stack(Axis(0), &views)
        .map_err(|e| EvalError::Rollout(format!("predicted frames differ in shape: {}", e)))?;
    Ok(Some(stacked.mapv(|x| (x * 255.0).clamp(0.0, 255.0) as u8)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ChunkScheduler;
    use ndarray::Array3;

    fn slot(rewards: &[f32], video: Option<&str>) -> SlotState {
        SlotState {
            done: true,
            rewards: rewards.to_vec(),
            predicted_frames: vec![Array3::from_elem((2, 2, 3), 0.5)],
            video: video.map(PathBuf::from),
        }
    }

    #[test]
    fn five_conditions_over_three_slots() {
        let plan = InitialConditionPlan::build(2, 1, 0, 3, 1, 100);
        let sched = ChunkScheduler::new(&plan, 3).unwrap();
        let mut agg = ResultAggregator::new(&plan, 3);

        let c0 = sched.chunk(0).unwrap();
        agg.ingest(&c0, &[slot(&[0.1, 0.4], Some("a")), slot(&[0.2], None), slot(&[0.9, 0.3], Some("c"))]).unwrap();
        let c1 = sched.chunk(1).unwrap();
        agg.ingest(&c1, &[slot(&[0.5], None), slot(&[0.7], None), slot(&[99.0], Some("pad"))]).unwrap();

        let report = agg.finalize().unwrap();
        let rewards: Vec<_> = report.conditions.iter().map(|r| r.max_reward).collect();
        assert_eq!(rewards, vec![0.4, 0.2, 0.9, 0.5, 0.7]);
        assert_eq!(report.conditions[0].video, Some(PathBuf::from("a")));
        assert!(report.conditions.iter().all(|r| r.video.as_deref() != Some(std::path::Path::new("pad"))));

        let train = report.mean_score(Group::Train).unwrap();
        let test = report.mean_score(Group::Test).unwrap();
        assert!((train - 0.3).abs() < 1e-6);
        assert!((test - (0.9 + 0.5 + 0.7) / 3.0).abs() < 1e-6);

        assert_eq!(report.slot_videos.len(), 3);
        assert_eq!(report.slot_videos[2].frames.shape(), &[2, 2, 2, 3]);
        assert_eq!(report.slot_videos[2].frames[[0, 0, 0, 0]], 127);
    }

    #[test]
    fn wrong_slot_count_is_an_aggregation_error() {
        let plan = InitialConditionPlan::build(2, 0, 0, 0, 0, 0);
        let chunk = ChunkScheduler::new(&plan, 3).unwrap().chunk(0).unwrap();
        let mut table = ResultTable::new(plan.len());
        let err = table.ingest(&chunk, &[slot(&[1.0], None), slot(&[1.0], None)]).unwrap_err();
        assert!(matches!(err, EvalError::Aggregation { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn chunk_beyond_the_table_is_out_of_range() {
        let plan = InitialConditionPlan::build(3, 0, 0, 0, 0, 0);
        let chunk = ChunkScheduler::new(&plan, 3).unwrap().chunk(0).unwrap();
        let mut table = ResultTable::new(2);
        let slots = vec![slot(&[1.0], None); 3];
        let err = table.ingest(&chunk, &slots).unwrap_err();
        assert!(matches!(err, EvalError::ChunkOutOfRange { start: 0, end: 3, len: 2 }));
        assert_eq!(err.to_string(), "Chunk covering conditions 0..3 does not fit a table of 2 conditions");
    }

    #[test]
    fn failed_ingest_leaves_the_table_untouched() {
        let plan = InitialConditionPlan::build(3, 0, 0, 0, 0, 0);
        let sched = ChunkScheduler::new(&plan, 2).unwrap();
        let mut table = ResultTable::new(plan.len());

        // Slot 0 is fine, slot 1 has nothing to report.
        let c0 = sched.chunk(0).unwrap();
        let err = table.ingest(&c0, &[slot(&[0.5], Some("a")), slot(&[], None)]).unwrap_err();
        assert!(matches!(err, EvalError::Rollout(_)));
        assert_eq!(table, ResultTable::new(plan.len()));

        // Condition 2 is already recorded; condition 0 of the same chunk must not be.
        let c1 = sched.chunk(1).unwrap();
        table.ingest(&c1, &[slot(&[0.7], None), slot(&[9.0], None)]).unwrap();
        let before = table.clone();
        let mixed = ChunkScheduler::new(&plan, 3).unwrap().chunk(0).unwrap();
        let err = table
            .ingest(&mixed, &[slot(&[0.1], None), slot(&[0.2], None), slot(&[0.3], None)])
            .unwrap_err();
        assert!(matches!(err, EvalError::DuplicateResult(2)));
        assert_eq!(table, before);
        assert_eq!(table.max_reward(0), None);
    }

    #[test]
    fn writing_a_condition_twice_is_rejected() {
        let plan = InitialConditionPlan::build(1, 0, 0, 0, 0, 0);
        let chunk = ChunkScheduler::new(&plan, 1).unwrap().chunk(0).unwrap();
        let mut table = ResultTable::new(1);
        table.ingest(&chunk, &[slot(&[1.0], None)]).unwrap();
        assert!(matches!(table.ingest(&chunk, &[slot(&[2.0], None)]), Err(EvalError::DuplicateResult(0))));
        assert_eq!(table.max_reward(0), Some(1.0));
    }

    #[test]
    fn missing_conditions_fail_finalize() {
        let plan = InitialConditionPlan::build(4, 0, 0, 0, 0, 0);
        let chunk = ChunkScheduler::new(&plan, 2).unwrap().chunk(0).unwrap();
        let mut agg = ResultAggregator::new(&plan, 2);
        agg.ingest(&chunk, &[slot(&[1.0], None), slot(&[1.0], None)]).unwrap();
        assert!(!agg.table().is_complete());
        assert!(matches!(agg.finalize(), Err(EvalError::Aggregation { .. })));
    }

    #[test]
    fn empty_reward_trace_is_an_error() {
        let plan = InitialConditionPlan::build(1, 0, 0, 0, 0, 0);
        let chunk = ChunkScheduler::new(&plan, 1).unwrap().chunk(0).unwrap();
        let mut table = ResultTable::new(1);
        assert!(matches!(table.ingest(&chunk, &[slot(&[], None)]), Err(EvalError::Rollout(_))));
    }

    #[test]
    fn diagnostic_frames_are_clamped_and_require_equal_shapes() {
        let video = to_video(&[Array3::from_elem((1, 1, 1), 2.0), Array3::from_elem((1, 1, 1), -1.0)]).unwrap().unwrap();
        assert_eq!(video.as_slice().unwrap(), &[255, 0]);
        assert!(to_video(&[]).unwrap().is_none());
        assert!(to_video(&[Array3::zeros((1, 1, 1)), Array3::zeros((2, 1, 1))]).is_err());
    }
}
