use motion_watch_common::frame::PixelFrame;

/// Side length of the square drawn over each changed sample.
const MARK_SIZE: u32 = 4;

/// Mark changed sample locations on the canvas with half-transparent red
/// squares. Purely visual: detection has already copied its next reference
/// frame before this runs, so the marks never feed back into scoring.
pub fn highlight_changes(canvas: &mut PixelFrame, changed: &[(u32, u32)]) {
    let width = canvas.width();
    let height = canvas.height();

    for &(x, y) in changed {
        for dy in 0..MARK_SIZE {
            let py = y + dy;
            if py >= height {
                break;
            }
            for dx in 0..MARK_SIZE {
                let px = x + dx;
                if px >= width {
                    break;
                }
                let off = canvas.pixel_offset(px, py);
                let pixel = &mut canvas.data[off..off + 4];
                // 50% red over the existing color
                pixel[0] = ((pixel[0] as u16 + 255) / 2) as u8;
                pixel[1] /= 2;
                pixel[2] /= 2;
            }
        }
    }
}
