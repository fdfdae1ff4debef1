#![allow(dead_code)]

use std::path::Path;

use ndarray::Array3;
use rand::distributions::{Distribution, Uniform};
use rollout_eval::policy::to_bf16;
use rollout_eval::utils::rng::{RngStream, rng_from_seed};
use rollout_eval::{
    Env, EvalError, ExecutionContext, Info, Policy, Precision, Prediction, RenderFrame, Result, Step,
    VideoEncoder,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Point mass that has to reach the origin. It starts `0.3 + 0.1 * (seed % 5)`
/// away in a direction drawn from the seed; reward is the fraction of the
/// start distance covered. Done within 0.05 of the origin.
pub struct ReachEnv {
    pos: [f32; 2],
    start_dist: f32,
    seed: u64,
    rng: RngStream,
}

impl Default for ReachEnv {
    fn default() -> Self { Self { pos: [0.0; 2], start_dist: 1.0, seed: 0, rng: rng_from_seed(0) } }
}

/// Start distance for `seed`.
pub fn start_radius(seed: u64) -> f32 { 0.3 + 0.1 * (seed % 5) as f32 }

impl ReachEnv {
    fn dist(&self) -> f32 { (self.pos[0] * self.pos[0] + self.pos[1] * self.pos[1]).sqrt() }
}

impl Env for ReachEnv {
    type Obs = [f32; 2];
    type Act = [f32; 2];

    fn reset(&mut self, seed: Option<u64>) -> Result<([f32; 2], Info)> {
        if let Some(s) = seed {
            self.seed = s;
            self.rng = rng_from_seed(s);
        }
        let angle = Uniform::new(0.0f32, std::f32::consts::TAU).sample(&mut self.rng);
        let r = start_radius(self.seed);
        self.pos = [r * angle.cos(), r * angle.sin()];
        self.start_dist = self.dist();
        Ok((self.pos, Info::new()))
    }

    fn step(&mut self, action: [f32; 2]) -> Result<Step<[f32; 2]>> {
        if action.iter().any(|a| !a.is_finite()) {
            return Err(EvalError::Rollout("non-finite action".into()));
        }
        for (p, a) in self.pos.iter_mut().zip(action) {
            *p += a.clamp(-0.1, 0.1);
        }
        let dist = self.dist();
        let reward = (1.0 - dist / self.start_dist).clamp(0.0, 1.0);
        Ok(Step::new(self.pos, reward, dist < 0.05, false, Info::new()))
    }

    fn render(&self) -> Option<RenderFrame> {
        let shade = (self.dist().min(1.0) * 255.0) as u8;
        Some(RenderFrame::Pixels { width: 4, height: 4, data: vec![shade; 4 * 4 * 3] })
    }
}

/// Heads straight for the origin, `speed` per step.
pub struct GreedyReach {
    pub ctx: ExecutionContext,
    pub n_action_steps: usize,
    pub speed: f32,
    pub resets: usize,
    pub calls: usize,
    pub fail_after: Option<usize>,
    pub stack_lens: Vec<usize>,
}

impl GreedyReach {
    pub fn new(n_action_steps: usize, speed: f32) -> Self {
        Self {
            ctx: ExecutionContext::default(),
            n_action_steps,
            speed,
            resets: 0,
            calls: 0,
            fail_after: None,
            stack_lens: Vec::new(),
        }
    }
}

impl Policy for GreedyReach {
    type Obs = Vec<[f32; 2]>;
    type Act = Vec<[f32; 2]>;

    fn context(&self) -> ExecutionContext { self.ctx }

    fn reset(&mut self) { self.resets += 1; }

    fn predict_action(&mut self, obs: &[Vec<[f32; 2]>]) -> Result<Prediction<Vec<[f32; 2]>>> {
        self.calls += 1;
        if self.fail_after.is_some_and(|n| self.calls > n) {
            return Err(EvalError::Rollout("policy diverged".into()));
        }
        let mut actions = Vec::with_capacity(obs.len());
        let mut predicted_frames = Vec::with_capacity(obs.len());
        for stacked in obs {
            self.stack_lens.push(stacked.len());
            if self.ctx.precision == Precision::Bf16 {
                assert!(stacked.iter().flatten().all(|x| *x == to_bf16(*x)));
            }
            let mut p = *stacked.last().ok_or_else(|| EvalError::Rollout("empty observation stack".into()))?;
            let mut chunk = Vec::with_capacity(self.n_action_steps);
            let mut frames = Vec::with_capacity(self.n_action_steps);
            for _ in 0..self.n_action_steps {
                let dist = (p[0] * p[0] + p[1] * p[1]).sqrt();
                let step = if dist > 0.0 { self.speed.min(dist) / dist } else { 0.0 };
                let a = [-p[0] * step, -p[1] * step];
                p = [p[0] + a[0], p[1] + a[1]];
                chunk.push(a);
                frames.push(Array3::from_elem((4, 4, 3), dist.min(1.0)));
            }
            actions.push(chunk);
            predicted_frames.push(frames);
        }
        Ok(Prediction { actions, predicted_frames })
    }
}

/// Writes the number of recorded frames as the whole "video".
#[derive(Debug, Default)]
pub struct FrameCount;

impl VideoEncoder for FrameCount {
    fn encode(&self, path: &Path, frames: &[RenderFrame]) -> Result<()> {
        std::fs::write(path, frames.len().to_string())?;
        Ok(())
    }
}

/// Refuses every write.
#[derive(Debug, Default)]
pub struct FailingEncoder;

impl VideoEncoder for FailingEncoder {
    fn encode(&self, _path: &Path, _frames: &[RenderFrame]) -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "disk full").into())
    }
}
