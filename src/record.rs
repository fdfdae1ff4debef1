// Flat metrics mapping and the sinks that receive it.
//
// An `EvalReport` flattens into string keys:
//
// * `<group>/sim_max_reward_<seed>` - max reward of one condition
// * `<group>/sim_video_<seed>` - recording of a visualized condition
// * `<group>/mean_score` - mean max reward of the group
// * `video_<slot>` - slot-indexed diagnostic video
//
// How a sink stores or uploads these values is up to the sink.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ndarray::Array4;

use crate::aggregate::EvalReport;
use crate::core::Result;

/// A video handed to a sink, either on disk or in memory.
#[derive(Clone, Debug, PartialEq)]
pub enum VideoRef {
    File(PathBuf),
    /// `(T, H, W, C)` 8-bit frames.
    Frames(Array4<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogValue {
    Scalar(f32),
    Video(VideoRef),
}

impl LogValue {
    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            LogValue::Scalar(v) => Some(*v),
            LogValue::Video(_) => None,
        }
    }
}

pub type LogData = BTreeMap<String, LogValue>;

/// Receives the flattened results of a run.
pub trait MetricsSink {
    fn write(&mut self, data: &LogData) -> Result<()>;
}

/// Keeps every mapping in memory.
#[derive(Debug, Default)]
pub struct BufferedSink {
    buf: Vec<LogData>,
}

impl BufferedSink {
    pub fn new() -> Self { Self::default() }

    pub fn iter(&self) -> std::slice::Iter<'_, LogData> { self.buf.iter() }

    pub fn last(&self) -> Option<&LogData> { self.buf.last() }
}

impl MetricsSink for BufferedSink {
    fn write(&mut self, data: &LogData) -> Result<()> {
        self.buf.push(data.clone());
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn write(&mut self, _data: &LogData) -> Result<()> { Ok(()) }
}

impl EvalReport {
    /// Flattens the report into the key scheme listed at the top of this module.
    pub fn to_log_data(&self) -> LogData {
        let mut data = LogData::new();
        for r in &self.conditions {
            let prefix = r.group.label();
            data.insert(format!("{}/sim_max_reward_{}", prefix, r.seed), LogValue::Scalar(r.max_reward));
            if let Some(path) = &r.video {
                data.insert(
                    format!("{}/sim_video_{}", prefix, r.seed),
                    LogValue::Video(VideoRef::File(path.clone())),
                );
            }
        }
        for g in &self.groups {
            data.insert(format!("{}/mean_score", g.group.label()), LogValue::Scalar(g.mean_score));
        }
        for v in &self.slot_videos {
            data.insert(format!("video_{}", v.slot), LogValue::Video(VideoRef::Frames(v.frames.clone())));
        }
        data
    }
}
