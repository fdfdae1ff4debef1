// Wrappers that turn a plain Env into one evaluation slot.
//
// - RecordVideo: captures rendered frames into a per-episode recording
// - MultiStep: stacks observations, executes action chunks, keeps the reward trace
//
// An evaluation slot is `MultiStep<RecordVideo<E>>`, which implements EvalEnv.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::trace;

use crate::core::{Env, EvalEnv, EvalError, Info, RenderFrame, Result, Step};
use crate::utils::render::VideoEncoder;

/// Records every `steps_per_render`-th rendered frame while an output path is set.
///
/// The recording is written by the encoder when the recorder stops, which
/// happens on `stop_recording`, `finish_video` and at every reset.
pub struct RecordVideo<E: Env> {
    inner: E,
    encoder: Arc<dyn VideoEncoder>,
    steps_per_render: u32,
    step_count: u32,
    file_path: Option<PathBuf>,
    frames: Vec<RenderFrame>,
    recording: bool,
}

impl<E: Env> RecordVideo<E> {
    pub fn new(inner: E, encoder: Arc<dyn VideoEncoder>, steps_per_render: u32) -> Self {
        Self {
            inner,
            encoder,
            steps_per_render: steps_per_render.max(1),
            step_count: 1,
            file_path: None,
            frames: Vec::new(),
            recording: false,
        }
    }

    pub fn inner(&self) -> &E { &self.inner }
    pub fn inner_mut(&mut self) -> &mut E { &mut self.inner }
    pub fn into_inner(self) -> E { self.inner }

    /// Current output target.
    pub fn file_path(&self) -> Option<&Path> { self.file_path.as_deref() }

    pub fn set_file_path(&mut self, path: Option<PathBuf>) { self.file_path = path; }

    /// Whether frames have been captured since the recorder last stopped.
    pub fn is_recording(&self) -> bool { self.recording }

    /// Number of frames buffered for the current recording.
    pub fn buffered_frames(&self) -> usize { self.frames.len() }

    /// Stop the recorder, writing buffered frames to the output path.
    pub fn stop(&mut self) -> Result<()> {
        if self.recording {
            if let Some(path) = &self.file_path {
                trace!("writing {} frames to {:?}", self.frames.len(), path);
                self.encoder.encode(path, &self.frames)?;
            }
            self.frames.clear();
            self.recording = false;
        }
        Ok(())
    }
}

impl<E: Env> Env for RecordVideo<E> {
    type Obs = E::Obs;
    type Act = E::Act;

    fn reset(&mut self, seed: Option<u64>) -> Result<(Self::Obs, Info)> {
        let out = self.inner.reset(seed)?;
        self.stop()?;
        self.step_count = 1;
        Ok(out)
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        let s = self.inner.step(action)?;
        self.step_count += 1;
        if self.file_path.is_some() && self.step_count % self.steps_per_render == 0 {
            self.recording = true;
            if let Some(frame) = self.inner.render() {
                self.frames.push(frame);
            }
        }
        Ok(s)
    }

    fn render(&self) -> Option<RenderFrame> { self.inner.render() }
    fn close(&mut self) { self.inner.close() }
}

/// Info key of `MultiStep` steps: inner steps taken this episode.
pub const EPISODE_STEPS: &str = "episode_steps";
/// Info key set when `MultiStep` truncated the episode at its step cap.
pub const TIME_LIMIT: &str = "time_limit";

/// Runs action chunks against the inner environment and stacks the most
/// recent observations.
///
/// - Observation: the last `n_obs_steps` inner observations, oldest first,
///   front-padded with the oldest available one.
/// - Action: a chunk of 1..=`n_action_steps` inner actions. Once the episode is
///   done the rest of the chunk (and any later chunk) is skipped.
/// - Reward: the maximum inner reward seen this episode.
pub struct MultiStep<E: Env> {
    inner: E,
    n_obs_steps: usize,
    n_action_steps: usize,
    max_episode_steps: Option<usize>,
    seed: Option<u64>,
    obs: VecDeque<E::Obs>,
    rewards: Vec<f32>,
    terminated: bool,
    truncated: bool,
}

impl<E> MultiStep<E>
where
    E: Env,
    E::Obs: Clone,
{
    pub fn new(inner: E, n_obs_steps: usize, n_action_steps: usize, max_episode_steps: Option<usize>) -> Self {
        assert!(n_obs_steps > 0, "MultiStep requires n_obs_steps > 0");
        assert!(n_action_steps > 0, "MultiStep requires n_action_steps > 0");
        Self {
            inner,
            n_obs_steps,
            n_action_steps,
            max_episode_steps,
            seed: None,
            obs: VecDeque::with_capacity(n_obs_steps),
            rewards: Vec::new(),
            terminated: false,
            truncated: false,
        }
    }

    pub fn inner(&self) -> &E { &self.inner }
    pub fn inner_mut(&mut self) -> &mut E { &mut self.inner }
    pub fn into_inner(self) -> E { self.inner }

    pub fn n_obs_steps(&self) -> usize { self.n_obs_steps }
    pub fn n_action_steps(&self) -> usize { self.n_action_steps }

    /// Rewards of every inner step since the last reset.
    pub fn rewards(&self) -> &[f32] { &self.rewards }

    fn is_done(&self) -> bool { self.terminated || self.truncated }

    fn push_obs(&mut self, obs: E::Obs) {
        if self.obs.len() == self.n_obs_steps {
            self.obs.pop_front();
        }
        self.obs.push_back(obs);
    }

    fn stacked_obs(&self) -> Vec<E::Obs> {
        let mut out = Vec::with_capacity(self.n_obs_steps);
        if let Some(oldest) = self.obs.front() {
            for _ in self.obs.len()..self.n_obs_steps {
                out.push(oldest.clone());
            }
        }
        out.extend(self.obs.iter().cloned());
        out
    }
}

impl<E> Env for MultiStep<E>
where
    E: Env,
    E::Obs: Clone,
{
    type Obs = Vec<E::Obs>;
    type Act = Vec<E::Act>;

    fn reset(&mut self, seed: Option<u64>) -> Result<(Self::Obs, Info)> {
        let (obs, info) = self.inner.reset(seed.or(self.seed))?;
        self.obs.clear();
        self.push_obs(obs);
        self.rewards.clear();
        self.terminated = false;
        self.truncated = false;
        Ok((self.stacked_obs(), info))
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        if action.is_empty() || action.len() > self.n_action_steps {
            return Err(EvalError::Rollout(format!(
                "action chunk of length {} (expected 1..={})",
                action.len(),
                self.n_action_steps
            )));
        }
        if self.obs.is_empty() {
            return Err(EvalError::Rollout("step called before reset".into()));
        }
        let mut info = Info::new();
        for act in action {
            if self.is_done() {
                break;
            }
            let s = self.inner.step(act)?;
            self.push_obs(s.observation);
            self.rewards.push(s.reward);
            self.terminated |= s.terminated;
            self.truncated |= s.truncated;
            info = s.info;
            if let Some(max) = self.max_episode_steps {
                if self.rewards.len() >= max {
                    self.truncated = true;
                    info.insert(TIME_LIMIT, true);
                }
            }
        }
        info.insert(EPISODE_STEPS, self.rewards.len());
        let reward = self.rewards.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let reward = if reward.is_finite() { reward } else { 0.0 };
        Ok(Step::new(self.stacked_obs(), reward, self.terminated, self.truncated, info))
    }

    fn render(&self) -> Option<RenderFrame> { self.inner.render() }
    fn close(&mut self) { self.inner.close() }
}

impl<E> EvalEnv for MultiStep<RecordVideo<E>>
where
    E: Env,
    E::Obs: Clone,
{
    fn seed(&mut self, seed: u64) { self.seed = Some(seed); }

    fn stop_recording(&mut self) -> Result<()> { self.inner.stop() }

    fn set_video_path(&mut self, path: Option<PathBuf>) { self.inner.set_file_path(path); }

    fn finish_video(&mut self) -> Result<Option<PathBuf>> {
        self.inner.stop()?;
        Ok(self.inner.file_path.clone())
    }

    fn reward_trace(&self) -> Vec<f32> { self.rewards.clone() }
}
