pub mod rng;
pub mod render;

pub use rng::{IdGenerator, RngStream, rng_from_seed};
pub use render::{PngSequenceEncoder, VideoEncoder, encode_png, save_png};
