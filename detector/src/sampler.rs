use image::ImageReader;
use motion_watch_camera::Camera;
use motion_watch_common::frame::PixelFrame;
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("no frame available from the camera yet")]
    NoFrame,
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("frame is {got_width}x{got_height} but the session is {want_width}x{want_height}")]
    DimensionMismatch {
        got_width: u32,
        got_height: u32,
        want_width: u32,
        want_height: u32,
    },
}

/// Supplies the session with decoded frames, one per detection cycle.
///
/// The session calls [`FrameSource::sample_into`] on every tick; any error
/// means "skip this cycle" — the session logs it and keeps the previous
/// reference frame for the next attempt.
pub trait FrameSource: Send + 'static {
    /// Dimensions the source will deliver, decided at session start.
    fn probe_resolution(&mut self) -> Result<(u32, u32), SampleError>;

    /// Rasterize the current frame into the canvas. The canvas dimensions
    /// are fixed for the whole session; a frame of any other size is an
    /// error.
    fn sample_into(&mut self, canvas: &mut PixelFrame) -> Result<(), SampleError>;
}

/// Camera-backed frame source: pulls whatever frame is newest at tick time
/// and decodes it. The camera keeps streaming between ticks; frames that
/// arrive between two ticks are simply never looked at.
pub struct CameraSampler {
    camera: Camera,
}

impl CameraSampler {
    pub fn new(camera: Camera) -> Self {
        Self { camera }
    }
}

impl FrameSource for CameraSampler {
    fn probe_resolution(&mut self) -> Result<(u32, u32), SampleError> {
        let frame = self.camera.latest().ok_or(SampleError::NoFrame)?;
        let rgba = decode_rgba(&frame.data)?;
        Ok((rgba.width(), rgba.height()))
    }

    fn sample_into(&mut self, canvas: &mut PixelFrame) -> Result<(), SampleError> {
        let frame = self.camera.latest().ok_or(SampleError::NoFrame)?;
        rasterize(&frame.data, canvas)
    }
}

/// Decode a compressed frame and copy it into the canvas.
pub fn rasterize(encoded: &[u8], canvas: &mut PixelFrame) -> Result<(), SampleError> {
    let rgba = decode_rgba(encoded)?;
    if rgba.width() != canvas.width() || rgba.height() != canvas.height() {
        return Err(SampleError::DimensionMismatch {
            got_width: rgba.width(),
            got_height: rgba.height(),
            want_width: canvas.width(),
            want_height: canvas.height(),
        });
    }
    canvas.data.copy_from_slice(rgba.as_raw());
    Ok(())
}

fn decode_rgba(encoded: &[u8]) -> Result<image::RgbaImage, SampleError> {
    let img = ImageReader::new(Cursor::new(encoded))
        .with_guessed_format()
        .map_err(|e| SampleError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| SampleError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}
