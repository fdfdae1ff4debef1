// One chunk of lockstep rollouts.
//
// Every chunk starts by putting the shared environment batch and policy back
// into a clean state (`RolloutContext::reset_for`), then alternates
// inference and stepping until every slot reports completion.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info, trace};
use ndarray::Array3;

use crate::core::{EvalEnv, EvalError, Result};
use crate::plan::InitialCondition;
use crate::policy::{Policy, Transfer};
use crate::schedule::Chunk;
use crate::utils::rng::IdGenerator;
use crate::vector::SyncVectorEnv;

/// Mutable per-slot rollout state, created fresh for every chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlotState {
    pub done: bool,
    /// Reward trace of the episode, read back from the slot after completion.
    pub rewards: Vec<f32>,
    /// Predicted frames in time order.
    pub predicted_frames: Vec<Array3<f32>>,
    /// Recording of the episode, if the slot's condition was visualized.
    pub video: Option<PathBuf>,
}

impl SlotState {
    /// Largest reward of the episode, `None` for an empty trace.
    pub fn max_reward(&self) -> Option<f32> {
        self.rewards.iter().copied().reduce(f32::max)
    }
}

/// Inference timing for one chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChunkStats {
    pub steps: usize,
    pub mean_inference: Duration,
    pub max_inference: Duration,
}

impl ChunkStats {
    fn from_timings(timings: &[Duration]) -> Self {
        let steps = timings.len();
        let total: Duration = timings.iter().sum();
        Self {
            steps,
            mean_inference: if steps == 0 { Duration::ZERO } else { total / steps as u32 },
            max_inference: timings.iter().copied().max().unwrap_or_default(),
        }
    }
}

/// Everything a chunk produced: one state per physical slot.
#[derive(Clone, Debug)]
pub struct ChunkOutput {
    pub slots: Vec<SlotState>,
    pub stats: ChunkStats,
}

/// Allocates unique recording targets under `<output_dir>/media`.
#[derive(Debug)]
pub struct MediaDir {
    dir: PathBuf,
    ids: IdGenerator,
}

impl MediaDir {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self::with_ids(output_dir, IdGenerator::from_entropy())
    }

    pub fn with_ids(output_dir: impl AsRef<Path>, ids: IdGenerator) -> Self {
        Self { dir: output_dir.as_ref().join("media"), ids }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    /// A fresh target path. Creates the media directory, but not its parents.
    pub fn allocate(&mut self) -> io::Result<PathBuf> {
        match std::fs::create_dir(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.dir.is_dir() => {}
            Err(e) => return Err(e),
        }
        let path = self.dir.join(self.ids.generate_id());
        debug!("allocated media target {:?}", path);
        Ok(path)
    }
}

/// Configures one slot for `condition`: stops and clears the recorder, sets a
/// fresh recording target when the condition is visualized, and seeds the
/// slot's next episode.
pub fn apply_condition<E: EvalEnv>(
    slot: usize,
    env: &mut E,
    condition: &InitialCondition,
    media: &mut MediaDir,
) -> Result<()> {
    let slot_init = |source: EvalError| EvalError::SlotInit { slot, source: Box::new(source) };
    env.stop_recording().map_err(slot_init)?;
    env.set_video_path(None);
    if condition.visualize {
        let path = media.allocate().map_err(|e| slot_init(e.into()))?;
        env.set_video_path(Some(path));
    }
    env.seed(condition.seed);
    Ok(())
}

/// The environment batch and policy shared by every chunk of a run.
pub struct RolloutContext<'a, E: EvalEnv, P> {
    pub envs: &'a mut SyncVectorEnv<E>,
    pub policy: &'a mut P,
    pub media: &'a mut MediaDir,
}

impl<'a, E, P> RolloutContext<'a, E, P>
where
    E: EvalEnv,
    E::Obs: Transfer,
    P: Policy<Obs = E::Obs, Act = E::Act>,
{
    pub fn new(envs: &'a mut SyncVectorEnv<E>, policy: &'a mut P, media: &'a mut MediaDir) -> Self {
        Self { envs, policy, media }
    }

    /// Clears every trace of the previous chunk: per-slot recorder, output
    /// target and seed, then the episode itself and the policy's memory.
    /// Returns the initial batched observation.
    pub fn reset_for(&mut self, chunk: &Chunk) -> Result<Vec<E::Obs>> {
        if chunk.width() != self.envs.len() {
            return Err(EvalError::Config(format!(
                "chunk of width {} scheduled on {} environments",
                chunk.width(),
                self.envs.len()
            )));
        }
        let media = &mut *self.media;
        self.envs
            .call_each(chunk.slot_conditions(), |slot, env, condition| {
                apply_condition(slot, env, condition, media)
            })?;
        let obs = self.envs.reset_all()?;
        self.policy.reset();
        Ok(obs)
    }

    /// Runs `chunk` until every slot is done and reads back each slot's
    /// reward trace and recording.
    pub fn run_chunk(&mut self, chunk: &Chunk, n_chunks: usize) -> Result<ChunkOutput> {
        info!(
            "Eval chunk {}/{}: conditions {}..{} ({} padding slots)",
            chunk.index + 1,
            n_chunks,
            chunk.start,
            chunk.end,
            chunk.padding_count()
        );
        let width = chunk.width();
        let mut obs = self.reset_for(chunk)?;
        let ctx = self.policy.context();
        let mut slots = vec![SlotState::default(); width];
        let mut timings = Vec::new();

        while !slots.iter().all(|s| s.done) {
            let batch: Vec<E::Obs> = obs.iter().map(|o| o.transfer(&ctx)).collect();

            let started = Instant::now();
            let prediction = self.policy.predict_action(&batch)?;
            timings.push(started.elapsed());

            if prediction.actions.len() != width {
                return Err(EvalError::Rollout(format!(
                    "policy returned {} actions for {} slots",
                    prediction.actions.len(),
                    width
                )));
            }
            if !prediction.predicted_frames.is_empty() && prediction.predicted_frames.len() != width {
                return Err(EvalError::Rollout(format!(
                    "policy returned predicted frames for {} of {} slots",
                    prediction.predicted_frames.len(),
                    width
                )));
            }

            let step = self.envs.step_all(prediction.actions)?;
            for (slot, done) in slots.iter_mut().zip(&step.dones) {
                slot.done |= *done;
            }
            for (slot, frames) in slots.iter_mut().zip(prediction.predicted_frames) {
                slot.predicted_frames.extend(frames);
            }
            obs = step.observations;
            trace!(
                "chunk {} step {}: {}/{} slots done",
                chunk.index,
                timings.len(),
                slots.iter().filter(|s| s.done).count(),
                width
            );
        }

        let videos = self.envs.finish_videos()?;
        let traces = self.envs.get_attr(|e| e.reward_trace());
        for ((slot, video), rewards) in slots.iter_mut().zip(videos).zip(traces) {
            slot.video = video;
            slot.rewards = rewards;
        }

        let stats = ChunkStats::from_timings(&timings);
        debug!(
            "chunk {} finished after {} steps on {}: mean inference {:?}, max {:?}",
            chunk.index, stats.steps, ctx.device, stats.mean_inference, stats.max_inference
        );
        Ok(ChunkOutput { slots, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_reward_of_trace() {
        let s = SlotState { rewards: vec![0.1, 0.7, 0.3], ..Default::default() };
        assert_eq!(s.max_reward(), Some(0.7));
        assert_eq!(SlotState::default().max_reward(), None);
    }

    #[test]
    fn stats_from_timings() {
        let t = [Duration::from_millis(2), Duration::from_millis(4)];
        let s = ChunkStats::from_timings(&t);
        assert_eq!(s.steps, 2);
        assert_eq!(s.mean_inference, Duration::from_millis(3));
        assert_eq!(s.max_inference, Duration::from_millis(4));
        assert_eq!(ChunkStats::from_timings(&[]), ChunkStats::default());
    }

    #[test]
    fn media_dir_requires_existing_output_dir() {
        let root = tempdir::TempDir::new("media_dir").unwrap();
        let mut ok = MediaDir::with_ids(root.path(), IdGenerator::from_seed(1));
        let a = ok.allocate().unwrap();
        let b = ok.allocate().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(root.path().join("media").as_path()));
        assert!(root.path().join("media").is_dir());

        let mut missing = MediaDir::new(root.path().join("does/not/exist"));
        assert!(missing.allocate().is_err());
    }
}
