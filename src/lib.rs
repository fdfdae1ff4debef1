pub mod core;
pub mod policy;
pub mod utils;
pub mod vector;
pub mod wrappers;
pub mod plan;
pub mod schedule;
pub mod rollout;
pub mod aggregate;
pub mod record;
pub mod runner;

pub use crate::core::{Env, EvalEnv, EvalError, Info, InfoValue, RenderFrame, Result, Step};
pub use crate::policy::{Device, ExecutionContext, Policy, Precision, Prediction, Transfer};
pub use crate::vector::{BatchStep, SyncVectorEnv};
pub use crate::wrappers::{EPISODE_STEPS, MultiStep, RecordVideo, TIME_LIMIT};
pub use crate::plan::{Group, InitialCondition, InitialConditionPlan};
pub use crate::schedule::{Chunk, ChunkScheduler};
pub use crate::rollout::{ChunkOutput, ChunkStats, MediaDir, RolloutContext, SlotState, apply_condition};
pub use crate::aggregate::{ConditionRecord, EvalReport, GroupScore, ResultAggregator, ResultTable, SlotVideo};
pub use crate::record::{BufferedSink, LogData, LogValue, MetricsSink, NullSink, VideoRef};
pub use crate::runner::{EvalRunner, RunnerConfig, evaluate};
pub use crate::utils::{IdGenerator, PngSequenceEncoder, VideoEncoder, encode_png, save_png};
