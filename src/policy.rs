// Policy handle used by the rollout.
//
// The rollout treats the policy as a black box: it hands over a batch of
// observations already transferred to the policy's `ExecutionContext` and
// gets back one action per slot plus a diagnostic stream of predicted frames.

use std::fmt;

use ndarray::{Array, Array3, Dimension};

use crate::core::Result;

/// Where the policy runs. The rollout only passes it along.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(i) => write!(f, "cuda:{}", i),
        }
    }
}

/// Numeric precision the policy expects its inputs in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Precision {
    #[default]
    F32,
    /// bfloat16 values carried in f32 storage.
    Bf16,
}

/// Device and precision declared by a policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub device: Device,
    pub precision: Precision,
}

impl ExecutionContext {
    pub fn new(device: Device, precision: Precision) -> Self { Self { device, precision } }
}

/// Round toward zero to the nearest bfloat16 value.
#[inline]
pub fn to_bf16(x: f32) -> f32 {
    f32::from_bits(x.to_bits() & 0xFFFF_0000)
}

/// Conversion of an observation into a policy's execution context.
pub trait Transfer {
    fn transfer(&self, ctx: &ExecutionContext) -> Self;
}

impl Transfer for f32 {
    fn transfer(&self, ctx: &ExecutionContext) -> Self {
        match ctx.precision {
            Precision::F32 => *self,
            Precision::Bf16 => to_bf16(*self),
        }
    }
}

impl<const N: usize> Transfer for [f32; N] {
    fn transfer(&self, ctx: &ExecutionContext) -> Self { self.map(|x| x.transfer(ctx)) }
}

impl<T: Transfer> Transfer for Vec<T> {
    fn transfer(&self, ctx: &ExecutionContext) -> Self { self.iter().map(|x| x.transfer(ctx)).collect() }
}

impl<D: Dimension> Transfer for Array<f32, D> {
    fn transfer(&self, ctx: &ExecutionContext) -> Self {
        match ctx.precision {
            Precision::F32 => self.clone(),
            Precision::Bf16 => self.mapv(to_bf16),
        }
    }
}

/// Output of one inference call over the whole batch.
#[derive(Clone, Debug, Default)]
pub struct Prediction<A> {
    /// One action per slot.
    pub actions: Vec<A>,
    /// Predicted frames per slot, `[slot][t]`, each `(H, W, C)` with values in `[0, 1]`.
    /// Only used for diagnostic video, never for control.
    pub predicted_frames: Vec<Vec<Array3<f32>>>,
}

/// A policy evaluated by the rollout.
pub trait Policy {
    type Obs;
    type Act;

    /// Device and precision observations are transferred to before inference.
    fn context(&self) -> ExecutionContext;

    /// Clear episode-scoped state. Called once at the start of every chunk.
    fn reset(&mut self);

    /// Predict actions for all slots at once.
    fn predict_action(&mut self, obs: &[Self::Obs]) -> Result<Prediction<Self::Act>>;
}
