#![deny(clippy::disallowed_methods)]

mod animator;
mod config;
mod decode;
mod error;
mod result;
mod scale;
mod source;
mod store;
mod surface;
#[cfg(test)]
mod testgif;

pub use animator::{Animator, AnimatorState, UpdateStrategy};
pub use config::{Config, DEFAULT_MAX_CACHE_BYTES, DEFAULT_PREFETCH_FRAMES};
pub use decode::{Disposal, GifImage, LoopCount, RawFrame};
pub use error::{DecodeError, Error};
pub use result::Result;
pub use source::{AssetBundle, GifSource};
pub use store::FrameStore;
pub use surface::{Animatable, ContentMode, ImageSlot, PixelDimensions, Rect};

// export libs
pub use image;
