// A synchronous vector environment running N interchangeable slots in lockstep.

use std::path::PathBuf;

use crate::core::{Env, EvalEnv, EvalError, Info, RenderFrame, Result};

/// One lockstep step of every slot, split into per-slot columns.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchStep<Obs> {
    pub observations: Vec<Obs>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub infos: Vec<Info>,
}

impl<Obs> BatchStep<Obs> {
    /// Whether every slot reported episode completion.
    pub fn all_done(&self) -> bool { self.dones.iter().all(|d| *d) }
}

/// Runs N copies of an environment in the current thread.
///
/// - Construct with `SyncVectorEnv::new(n, || MyEnv::default())`
/// - Step with a batch of actions: `step_all(actions)`
/// - Initialize each slot with its own argument: `call_each(&args, |slot, env, arg| ...)`
pub struct SyncVectorEnv<E: Env> {
    envs: Vec<E>,
}

impl<E: Env> SyncVectorEnv<E> {
    /// Create N copies using the provided factory closure.
    pub fn new<F>(n: usize, mut factory: F) -> Self
    where
        F: FnMut() -> E,
    {
        let mut envs = Vec::with_capacity(n);
        for _ in 0..n {
            envs.push(factory());
        }
        Self { envs }
    }

    /// Number of contained environments.
    pub fn len(&self) -> usize { self.envs.len() }
    /// Whether there are no environments.
    pub fn is_empty(&self) -> bool { self.envs.is_empty() }

    /// Reset all environments without an explicit seed, so each slot uses
    /// whatever seed it was configured with.
    pub fn reset_all(&mut self) -> Result<Vec<E::Obs>> {
        self.envs
            .iter_mut()
            .map(|e| e.reset(None).map(|(obs, _info)| obs))
            .collect()
    }

    /// Step all environments with a batch of actions.
    /// The length of `actions` must equal `self.len()`.
    pub fn step_all(&mut self, actions: Vec<E::Act>) -> Result<BatchStep<E::Obs>> {
        if actions.len() != self.envs.len() {
            return Err(EvalError::Rollout(format!(
                "got {} actions for {} environments",
                actions.len(),
                self.envs.len()
            )));
        }
        let n = self.envs.len();
        let mut batch = BatchStep {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            dones: Vec::with_capacity(n),
            infos: Vec::with_capacity(n),
        };
        for (e, a) in self.envs.iter_mut().zip(actions) {
            let s = e.step(a)?;
            let done = s.is_done();
            batch.observations.push(s.observation);
            batch.rewards.push(s.reward);
            batch.dones.push(done);
            batch.infos.push(s.info);
        }
        Ok(batch)
    }

    /// Apply `f` to every slot with that slot's own argument.
    /// The length of `args` must equal `self.len()`; the first error aborts the call.
    pub fn call_each<A, F>(&mut self, args: &[A], mut f: F) -> Result<()>
    where
        F: FnMut(usize, &mut E, &A) -> Result<()>,
    {
        if args.len() != self.envs.len() {
            return Err(EvalError::Rollout(format!(
                "got {} slot arguments for {} environments",
                args.len(),
                self.envs.len()
            )));
        }
        for (i, (e, a)) in self.envs.iter_mut().zip(args).enumerate() {
            f(i, e, a)?;
        }
        Ok(())
    }

    /// Read one value from every slot, in slot order.
    pub fn get_attr<T, F>(&self, f: F) -> Vec<T>
    where
        F: Fn(&E) -> T,
    {
        self.envs.iter().map(f).collect()
    }

    /// Render all environments; returns a vector of optional frames (one per env).
    pub fn render_all(&self) -> Vec<Option<RenderFrame>> {
        self.envs.iter().map(|e| e.render()).collect()
    }

    /// Close all environments.
    pub fn close_all(&mut self) {
        for e in &mut self.envs { e.close(); }
    }

}

impl<E: EvalEnv> SyncVectorEnv<E> {
    /// Stop every slot's recorder and return its video target, in slot order.
    pub fn finish_videos(&mut self) -> Result<Vec<Option<PathBuf>>> {
        self.envs.iter_mut().map(|e| e.finish_video()).collect()
    }
}
