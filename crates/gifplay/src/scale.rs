use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::surface::{ContentMode, PixelDimensions};

const FILTER_TYPE: FilterType = FilterType::CatmullRom;

/// Map a full-canvas frame onto the surface's target size.
///
/// A zero target or an exact size match hands back the frame untouched,
/// which is the common case for GIFs shown at native size.
#[profiling::function]
pub(crate) fn fit_frame(frame: &RgbaImage, target: PixelDimensions, mode: ContentMode) -> RgbaImage {
    if target.is_zero() || (target.x == frame.width() && target.y == frame.height()) {
        return frame.clone();
    }

    match mode {
        ContentMode::ScaleToFill => imageops::resize(frame, target.x, target.y, FILTER_TYPE),
        ContentMode::AspectFit => aspect_fit(frame, target),
        ContentMode::AspectFill => aspect_fill(frame, target),
    }
}

/// Scale to fit inside `target`, centered on a transparent canvas.
fn aspect_fit(frame: &RgbaImage, target: PixelDimensions) -> RgbaImage {
    let mut scaled = scaled_size(frame, target, false);
    scaled.x = scaled.x.min(target.x);
    scaled.y = scaled.y.min(target.y);

    let resized = imageops::resize(frame, scaled.x, scaled.y, FILTER_TYPE);
    let mut out = RgbaImage::new(target.x, target.y);
    let dx = ((target.x - scaled.x) / 2) as i64;
    let dy = ((target.y - scaled.y) / 2) as i64;
    imageops::overlay(&mut out, &resized, dx, dy);
    out
}

/// Scale to cover `target`, then crop the overflow evenly on both sides.
fn aspect_fill(frame: &RgbaImage, target: PixelDimensions) -> RgbaImage {
    let mut scaled = scaled_size(frame, target, true);
    scaled.x = scaled.x.max(target.x);
    scaled.y = scaled.y.max(target.y);

    let resized = imageops::resize(frame, scaled.x, scaled.y, FILTER_TYPE);
    let crop_x = (scaled.x - target.x) / 2;
    let crop_y = (scaled.y - target.y) / 2;
    imageops::crop_imm(&resized, crop_x, crop_y, target.x, target.y).to_image()
}

fn scaled_size(frame: &RgbaImage, target: PixelDimensions, cover: bool) -> PixelDimensions {
    let sx = target.x as f32 / frame.width() as f32;
    let sy = target.y as f32 / frame.height() as f32;
    let scale = if cover { sx.max(sy) } else { sx.min(sy) };

    PixelDimensions {
        x: ((frame.width() as f32 * scale).round() as u32).max(1),
        y: ((frame.height() as f32 * scale).round() as u32).max(1),
    }
}
