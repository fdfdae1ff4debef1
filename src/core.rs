// Core traits and types shared by the environment batch and the rollout engine.

use std::path::PathBuf;

/// Per-step key-value annotations, in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Info {
    entries: Vec<(String, InfoValue)>,
}

impl Info {
    pub fn new() -> Self { Self { entries: Vec::new() } }

    /// Insert or replace a key with the given value.
    pub fn insert<K: Into<String>>(&mut self, key: K, value: impl Into<InfoValue>) {
        let k = key.into();
        let value = value.into();
        if let Some((_, v)) = self.entries.iter_mut().find(|(kk, _)| kk == &k) {
            *v = value;
        } else {
            self.entries.push((k, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InfoValue {
    Bool(bool),
    Count(usize),
}

impl From<bool> for InfoValue { fn from(v: bool) -> Self { InfoValue::Bool(v) } }
impl From<usize> for InfoValue { fn from(v: usize) -> Self { InfoValue::Count(v) } }

/// A frame returned by `Env::render`.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderFrame {
    /// Textual representation of a frame (e.g., a debug string).
    Text(String),
    /// Raw pixel buffer in row-major RGB or RGBA format.
    Pixels {
        width: u32,
        height: u32,
        /// Pixel data. Convention: RGB uses 3 bytes per pixel, RGBA uses 4.
        data: Vec<u8>,
    },
}

/// A step result from the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Step<Obs> {
    pub observation: Obs,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

impl<Obs> Step<Obs> {
    pub fn new(observation: Obs, reward: f32, terminated: bool, truncated: bool, info: Info) -> Self {
        Self { observation, reward, terminated, truncated, info }
    }

    /// Terminated or truncated.
    pub fn is_done(&self) -> bool { self.terminated || self.truncated }
}

/// Errors raised while planning, running or aggregating an evaluation.
#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to initialize slot {slot}: {source}")]
    SlotInit {
        slot: usize,
        #[source]
        source: Box<EvalError>,
    },
    #[error("Rollout failed: {0}")]
    Rollout(String),
    #[error("Expected {expected} results starting at condition {start}, got {actual}")]
    Aggregation { start: usize, expected: usize, actual: usize },
    #[error("Chunk covering conditions {start}..{end} does not fit a table of {len} conditions")]
    ChunkOutOfRange { start: usize, end: usize, len: usize },
    #[error("Result for condition {0} was already recorded")]
    DuplicateResult(usize),
    #[error("Operation not supported: {0}")]
    NotSupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience alias for results using EvalError.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Environment contract, one physical slot of a batch.
pub trait Env {
    type Obs;
    type Act;

    /// Reset the environment to an initial state.
    /// Implementations should re-seed internal RNGs when `seed` is provided.
    fn reset(&mut self, seed: Option<u64>) -> Result<(Self::Obs, Info)>;

    /// Apply an action and advance the environment by one step.
    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>>;

    /// Render a frame of the current state, if supported.
    fn render(&self) -> Option<RenderFrame> { None }

    /// Close and release any external resources.
    fn close(&mut self) {}
}

/// Per-slot capabilities the evaluation rollout needs on top of [`Env`].
///
/// A chunk uses these to put a reused slot back into a clean state before the
/// episode and to read the episode's outputs back once every slot is done.
pub trait EvalEnv: Env {
    /// Seed used by every subsequent `reset(None)`.
    fn seed(&mut self, seed: u64);

    /// Stop any in-progress recording, flushing what was captured.
    fn stop_recording(&mut self) -> Result<()>;

    /// Set (or clear) the output target of the next recording.
    fn set_video_path(&mut self, path: Option<PathBuf>);

    /// Stop recording and return the output target of the finished episode.
    fn finish_video(&mut self) -> Result<Option<PathBuf>>;

    /// Every reward observed since the last reset, in step order.
    fn reward_trace(&self) -> Vec<f32>;
}
