// Configuration and entry point of an evaluation run.
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::aggregate::{EvalReport, ResultAggregator};
use crate::core::{Env, EvalEnv, EvalError, Result};
use crate::plan::InitialConditionPlan;
use crate::policy::{Policy, Transfer};
use crate::record::MetricsSink;
use crate::rollout::{MediaDir, RolloutContext};
use crate::schedule::ChunkScheduler;
use crate::utils::render::{PngSequenceEncoder, VideoEncoder};
use crate::vector::SyncVectorEnv;
use crate::wrappers::{MultiStep, RecordVideo};

/// Configuration of [`EvalRunner`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct RunnerConfig {
    /// Recordings go to `<output_dir>/media`. The directory must exist.
    pub output_dir: PathBuf,

    /// Number of train conditions.
    pub n_train: usize,

    /// Number of train conditions recorded to video, counted from the first.
    pub n_train_vis: usize,

    pub train_start_seed: u64,

    /// Number of test conditions.
    pub n_test: usize,

    /// Number of test conditions recorded to video, counted from the first.
    pub n_test_vis: usize,

    pub test_start_seed: u64,

    /// Episode cap in environment steps.
    pub max_steps: usize,

    /// Observations stacked per policy input.
    pub n_obs_steps: usize,

    /// Maximum environment steps per policy action chunk.
    pub n_action_steps: usize,

    /// Frame rate of recordings; every `max(10 / fps, 1)`-th step is captured.
    pub fps: u32,

    /// Batch width. `None` runs every condition in a single chunk.
    pub n_envs: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            n_train: 10,
            n_train_vis: 3,
            train_start_seed: 0,
            n_test: 22,
            n_test_vis: 6,
            test_start_seed: 10_000,
            max_steps: 200,
            n_obs_steps: 8,
            n_action_steps: 8,
            fps: 10,
            n_envs: None,
        }
    }
}

impl RunnerConfig {
    /// Sets the output directory.
    pub fn output_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.output_dir = v.into();
        self
    }

    /// Sets the train group: size, recorded count and first seed.
    pub fn train(mut self, n: usize, n_vis: usize, start_seed: u64) -> Self {
        self.n_train = n;
        self.n_train_vis = n_vis;
        self.train_start_seed = start_seed;
        self
    }

    /// Sets the test group: size, recorded count and first seed.
    pub fn test(mut self, n: usize, n_vis: usize, start_seed: u64) -> Self {
        self.n_test = n;
        self.n_test_vis = n_vis;
        self.test_start_seed = start_seed;
        self
    }

    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    pub fn n_obs_steps(mut self, v: usize) -> Self {
        self.n_obs_steps = v;
        self
    }

    pub fn n_action_steps(mut self, v: usize) -> Self {
        self.n_action_steps = v;
        self
    }

    pub fn fps(mut self, v: u32) -> Self {
        self.fps = v;
        self
    }

    pub fn n_envs(mut self, v: usize) -> Self {
        self.n_envs = Some(v);
        self
    }

    /// Batch width after applying the default.
    pub fn resolved_n_envs(&self) -> usize { self.n_envs.unwrap_or(self.n_train + self.n_test) }

    pub fn steps_per_render(&self) -> u32 { (10 / self.fps.max(1)).max(1) }

    pub fn plan(&self) -> InitialConditionPlan {
        InitialConditionPlan::build(
            self.n_train,
            self.n_train_vis,
            self.train_start_seed,
            self.n_test,
            self.n_test_vis,
            self.test_start_seed,
        )
    }

    /// Rejects configurations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.n_train + self.n_test == 0 {
            return Err(EvalError::Config("no initial conditions to evaluate".into()));
        }
        if self.resolved_n_envs() == 0 {
            return Err(EvalError::Config("n_envs must be at least 1".into()));
        }
        if self.n_obs_steps == 0 || self.n_action_steps == 0 {
            return Err(EvalError::Config("n_obs_steps and n_action_steps must be at least 1".into()));
        }
        if self.fps == 0 {
            return Err(EvalError::Config("fps must be at least 1".into()));
        }
        if self.n_train_vis > self.n_train || self.n_test_vis > self.n_test {
            return Err(EvalError::Config(format!(
                "visualized counts ({}, {}) exceed group sizes ({}, {})",
                self.n_train_vis, self.n_test_vis, self.n_train, self.n_test
            )));
        }
        Ok(())
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let rdr = BufReader::new(File::open(path)?);
        let config = serde_yaml::from_reader(rdr)?;
        Ok(config)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Runs every chunk of `plan` on `envs` and aggregates the results.
///
/// Works with any batch of [`EvalEnv`] slots; [`EvalRunner`] is the usual way in.
pub fn evaluate<E, P>(
    envs: &mut SyncVectorEnv<E>,
    plan: &InitialConditionPlan,
    policy: &mut P,
    media: &mut MediaDir,
) -> Result<EvalReport>
where
    E: EvalEnv,
    E::Obs: Transfer,
    P: Policy<Obs = E::Obs, Act = E::Act>,
{
    let scheduler = ChunkScheduler::new(plan, envs.len())?;
    let n_chunks = scheduler.n_chunks();
    info!(
        "Evaluating {} initial conditions on {} environments in {} chunks",
        plan.len(),
        envs.len(),
        n_chunks
    );

    let mut aggregator = ResultAggregator::new(plan, envs.len());
    {
        let mut ctx = RolloutContext::new(envs, policy, media);
        for chunk in scheduler.iter() {
            let output = ctx.run_chunk(&chunk, n_chunks)?;
            aggregator.ingest(&chunk, &output.slots)?;
        }
    }
    // Drop whatever the recorders still hold.
    envs.reset_all()?;

    let report = aggregator.finalize()?;
    for g in &report.groups {
        info!("{}/mean_score = {:.4}", g.group, g.mean_score);
    }
    Ok(report)
}

/// Evaluation runner over a batch of `MultiStep<RecordVideo<E>>` slots.
pub struct EvalRunner<E>
where
    E: Env,
    E::Obs: Clone,
{
    config: RunnerConfig,
    plan: InitialConditionPlan,
    envs: SyncVectorEnv<MultiStep<RecordVideo<E>>>,
    media: MediaDir,
}

impl<E> EvalRunner<E>
where
    E: Env,
    E::Obs: Clone,
{
    /// Builds the runner, recording videos as PNG sequences.
    pub fn new<F>(config: RunnerConfig, factory: F) -> Result<Self>
    where
        F: FnMut() -> E,
    {
        Self::with_encoder(config, Arc::new(PngSequenceEncoder), factory)
    }

    /// Builds the runner with a custom video encoder. `factory` is called once
    /// per slot.
    pub fn with_encoder<F>(config: RunnerConfig, encoder: Arc<dyn VideoEncoder>, mut factory: F) -> Result<Self>
    where
        F: FnMut() -> E,
    {
        config.validate()?;
        let steps_per_render = config.steps_per_render();
        let envs = SyncVectorEnv::new(config.resolved_n_envs(), || {
            MultiStep::new(
                RecordVideo::new(factory(), encoder.clone(), steps_per_render),
                config.n_obs_steps,
                config.n_action_steps,
                Some(config.max_steps),
            )
        });
        Ok(Self {
            plan: config.plan(),
            media: MediaDir::new(&config.output_dir),
            config,
            envs,
        })
    }

    /// Replaces the media directory, e.g. to make recording names reproducible.
    pub fn set_media(&mut self, media: MediaDir) { self.media = media; }

    pub fn config(&self) -> &RunnerConfig { &self.config }

    pub fn plan(&self) -> &InitialConditionPlan { &self.plan }

    pub fn n_envs(&self) -> usize { self.envs.len() }

    /// Evaluates `policy` on every initial condition.
    pub fn run<P>(&mut self, policy: &mut P) -> Result<EvalReport>
    where
        E::Obs: Transfer,
        P: Policy<Obs = Vec<E::Obs>, Act = Vec<E::Act>>,
    {
        evaluate(&mut self.envs, &self.plan, policy, &mut self.media)
    }

    /// Evaluates `policy` and writes the flattened report to `sink`.
    pub fn run_and_record<P, S>(&mut self, policy: &mut P, sink: &mut S) -> Result<EvalReport>
    where
        E::Obs: Transfer,
        P: Policy<Obs = Vec<E::Obs>, Act = Vec<E::Act>>,
        S: MetricsSink + ?Sized,
    {
        let report = self.run(policy)?;
        sink.write(&report.to_log_data())?;
        Ok(report)
    }
}

impl<E> Drop for EvalRunner<E>
where
    E: Env,
    E::Obs: Clone,
{
    fn drop(&mut self) { self.envs.close_all(); }
}
