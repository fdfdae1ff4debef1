use std::fmt::Debug;
use std::path::Path;

use crate::core::{EvalError, RenderFrame, Result};

/// Encode a RenderFrame::Pixels to a PNG byte vector.
/// - When the `image` feature is enabled, this will encode using the `image` crate.
/// - Without the feature, returns EvalError::NotSupported.
pub fn encode_png(frame: &RenderFrame) -> Result<Vec<u8>> {
    match frame {
        RenderFrame::Pixels { width, height, data } => encode_pixels_png(*width, *height, data),
        RenderFrame::Text(_) => Err(EvalError::NotSupported("Text frames cannot be encoded to PNG".into())),
    }
}

#[cfg(feature = "image")]
fn encode_pixels_png(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    use image::codecs::png::PngEncoder;
    use image::{ColorType, ImageEncoder};
    use std::io::Cursor;

    let count = (width as usize) * (height as usize);
    let color = if data.len() == count * 3 {
        ColorType::Rgb8
    } else if data.len() == count * 4 {
        ColorType::Rgba8
    } else {
        return Err(EvalError::Rollout(format!(
            "Pixel data length {} does not match width*height*3 or *4 ({}x{})",
            data.len(), width, height
        )));
    };

    let mut buf = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buf);
        let encoder = PngEncoder::new(&mut cursor);
        encoder
            .write_image(data, width, height, color.into())
            .map_err(|e| EvalError::Rollout(format!("PNG encode error: {}", e)))?;
    }
    Ok(buf)
}

#[cfg(not(feature = "image"))]
fn encode_pixels_png(_width: u32, _height: u32, _data: &[u8]) -> Result<Vec<u8>> {
    Err(EvalError::NotSupported(
        "PNG encoding requires the `image` feature".into(),
    ))
}

/// Save a RenderFrame::Pixels as a PNG file at the given path.
pub fn save_png<P: AsRef<Path>>(path: P, frame: &RenderFrame) -> Result<()> {
    let bytes = encode_png(frame)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Writes the frames of one recorded episode to an output target.
///
/// How the frames are encoded is up to the implementation; the rollout only
/// hands over the target path and the frames in capture order.
pub trait VideoEncoder: Debug {
    fn encode(&self, path: &Path, frames: &[RenderFrame]) -> Result<()>;
}

/// Stores a recording as a directory of numbered PNG frames
/// (`frame_00000.png`, `frame_00001.png`, ...).
#[derive(Clone, Copy, Debug, Default)]
pub struct PngSequenceEncoder;

impl VideoEncoder for PngSequenceEncoder {
    fn encode(&self, path: &Path, frames: &[RenderFrame]) -> Result<()> {
        std::fs::create_dir_all(path)?;
        for (i, frame) in frames.iter().enumerate() {
            save_png(path.join(format!("frame_{:05}.png", i)), frame)?;
        }
        Ok(())
    }
}
