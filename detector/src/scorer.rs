use motion_watch_common::frame::PixelFrame;

/// Every 4th pixel is sampled; see [`diff_frames`].
pub const SAMPLE_STRIDE: usize = 4;

/// Outcome of comparing the current frame against the reference frame.
#[derive(Debug, Clone)]
pub struct DiffScore {
    /// Changed-sample count scaled back up by the sampling stride.
    pub scaled_changed_pixels: u32,
    /// Coordinates of each changed sampled pixel, for the overlay.
    pub changed: Vec<(u32, u32)>,
}

/// Compare two frames of identical dimensions.
///
/// Samples every 4th pixel of the flattened buffer (raster order) and sums
/// the absolute per-channel differences of R, G and B; alpha is ignored. A
/// sample counts as changed when its difference strictly exceeds
/// `sensitivity`. The returned count is multiplied by the stride to
/// compensate for the subsampling — an approximation, but thresholds are
/// tuned against it, so it is kept exact.
pub fn diff_frames(current: &PixelFrame, reference: &PixelFrame, sensitivity: u32) -> DiffScore {
    debug_assert_eq!(current.width(), reference.width());
    debug_assert_eq!(current.height(), reference.height());

    let width = current.width();
    let mut changed = Vec::new();

    let len = current.data.len().min(reference.data.len());
    let mut i = 0;
    while i + 2 < len {
        let dr = current.data[i].abs_diff(reference.data[i]) as u32;
        let dg = current.data[i + 1].abs_diff(reference.data[i + 1]) as u32;
        let db = current.data[i + 2].abs_diff(reference.data[i + 2]) as u32;

        if dr + dg + db > sensitivity {
            let pixel = (i / 4) as u32;
            changed.push((pixel % width, pixel / width));
        }

        i += SAMPLE_STRIDE * 4;
    }

    DiffScore {
        scaled_changed_pixels: changed.len() as u32 * SAMPLE_STRIDE as u32,
        changed,
    }
}

/// Intensity of the current score as a percentage of the motion threshold,
/// clamped to [0, 100].
pub fn motion_level(scaled_changed_pixels: u32, min_pixels: u32) -> f64 {
    if min_pixels == 0 {
        return if scaled_changed_pixels == 0 { 0.0 } else { 100.0 };
    }
    (scaled_changed_pixels as f64 / min_pixels as f64 * 100.0).min(100.0)
}
