use std::sync::Arc;

use image::RgbaImage;

/// A size in physical pixels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PixelDimensions {
    pub x: u32,
    pub y: u32,
}

impl PixelDimensions {
    pub fn new(x: u32, y: u32) -> Self {
        PixelDimensions { x, y }
    }

    /// A degenerate size. Stores treat it as "use the native GIF size".
    pub fn is_zero(&self) -> bool {
        self.x == 0 || self.y == 0
    }
}

/// The rectangle a surface draws its image into. Playback only ever
/// looks at the size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(width: f32, height: f32) -> Self {
        Rect::new(0.0, 0.0, width, height)
    }

    pub fn pixel_size(&self) -> PixelDimensions {
        PixelDimensions {
            x: self.width.round().max(0.0) as u32,
            y: self.height.round().max(0.0) as u32,
        }
    }
}

/// How a frame is mapped onto a surface whose aspect ratio differs from
/// the GIF's.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ContentMode {
    /// Stretch to the surface size, ignoring aspect ratio.
    #[default]
    ScaleToFill,
    /// Scale to fit entirely inside the surface, letterboxing with
    /// transparent pixels.
    AspectFit,
    /// Scale to cover the surface, cropping the overflow evenly.
    AspectFill,
}

/// A place a surface lets the animator write the current frame into.
#[derive(Clone, Debug, Default)]
pub struct ImageSlot {
    pub image: Option<Arc<RgbaImage>>,
}

/// The contract a drawable surface implements to host an animation.
///
/// Surfaces that expose an [`ImageSlot`] get every new frame pushed into
/// it before the redraw request. Surfaces that don't are expected to pull
/// [`crate::Animator::active_frame`] when they repaint. Which of the two
/// applies is decided once, when an animation is bound to the surface.
pub trait Animatable {
    /// Where the animation is drawn. Only the size is used, to pick the
    /// rasterization target.
    fn frame_rect(&self) -> Rect;

    fn content_mode(&self) -> ContentMode;

    /// Called at most once per frame change.
    fn request_redraw(&mut self);

    /// Surfaces holding their own image state return a slot here to opt
    /// into push updates.
    fn image_slot(&mut self) -> Option<&mut ImageSlot> {
        None
    }
}
