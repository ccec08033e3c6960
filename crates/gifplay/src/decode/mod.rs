mod block;
pub(crate) mod rasterize;

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::DecodeError;
use crate::surface::PixelDimensions;

use block::ByteReader;

/// How many times an animation plays before holding its last frame.
///
/// This is the total number of play-throughs, so `Finite(1)` plays the
/// frames once. A Netscape extension value of zero, or no extension at
/// all, means [`LoopCount::Infinite`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoopCount {
    Infinite,
    Finite(u16),
}

/// What happens to a frame's canvas region once the next frame is due.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Disposal {
    /// Nothing specified. Compositing treats it like [`Disposal::Keep`].
    #[default]
    Unspecified,
    /// Leave the rendered region in place.
    Keep,
    /// Clear the region back to transparent.
    Background,
    /// Restore the canvas to its state before this frame was drawn.
    Previous,
}

impl Disposal {
    pub(crate) fn from_packed(packed: u8) -> Self {
        match (packed >> 2) & 0x07 {
            0 => Disposal::Unspecified,
            1 => Disposal::Keep,
            2 => Disposal::Background,
            3 => Disposal::Previous,
            other => {
                trace!("reserved disposal method {other}");
                Disposal::Unspecified
            }
        }
    }
}

/// One image block: where its compressed pixel data lives in the shared
/// buffer, plus everything needed to composite it onto the canvas.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub(crate) data: Range<usize>,
    pub(crate) min_code_size: u8,
    pub(crate) left: u16,
    pub(crate) top: u16,
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) interlaced: bool,
    pub(crate) local_table: Option<Range<usize>>,
    pub(crate) transparent_index: Option<u8>,
    pub disposal: Disposal,
    pub delay: Duration,
}

/// A decoded GIF: the original bytes plus an index of every frame.
///
/// Decoding walks the stream once and records where each frame's data
/// lives. Pixels are only expanded when a frame is rasterized, so
/// holding a [`GifImage`] costs little more than the file itself.
#[derive(Clone, Debug)]
pub struct GifImage {
    pub(crate) data: Arc<[u8]>,
    pub(crate) global_table: Option<Range<usize>>,
    pub frames: Vec<RawFrame>,
    pub size: PixelDimensions,
    pub loop_count: LoopCount,
}

impl GifImage {
    /// Decode with default delay handling. See [`GifImage::decode_with`].
    pub fn decode(data: impl Into<Arc<[u8]>>) -> Result<Self, DecodeError> {
        Self::decode_with(data, &Config::default())
    }

    /// Walk the stream and index every frame.
    ///
    /// Anything that makes the structure unreadable is an error. A
    /// missing trailer after the last complete block is tolerated, a cut
    /// inside a block is not.
    #[profiling::function]
    pub fn decode_with(data: impl Into<Arc<[u8]>>, config: &Config) -> Result<Self, DecodeError> {
        let data = data.into();
        let mut r = ByteReader::new(&data);

        let signature = r.take_slice(6)?;
        if &signature[..3] != b"GIF" {
            return Err(DecodeError::InvalidFormat("missing GIF signature"));
        }
        if &signature[3..] != b"87a" && &signature[3..] != b"89a" {
            return Err(DecodeError::UnsupportedVersion([
                signature[3],
                signature[4],
                signature[5],
            ]));
        }

        let screen = block::parse_logical_screen(&mut r)?;
        if screen.width == 0 || screen.height == 0 {
            return Err(DecodeError::InvalidFormat("zero logical screen size"));
        }

        let mut frames = Vec::new();
        let mut pending_control: Option<block::GraphicControl> = None;
        let mut loops: Option<u16> = None;

        loop {
            if r.at_end() {
                warn!("gif data ended without trailer");
                break;
            }
            match r.take_u8()? {
                block::IMAGE_SEPARATOR => {
                    let frame = read_frame(&mut r, pending_control.take(), config)?;
                    if frame.local_table.is_none() && screen.global_table.is_none() {
                        return Err(DecodeError::InvalidFormat("frame has no color table"));
                    }
                    frames.push(frame);
                }
                block::EXTENSION_INTRODUCER => match r.take_u8()? {
                    block::GRAPHIC_CONTROL_LABEL => {
                        pending_control = Some(block::parse_graphic_control(&mut r)?);
                    }
                    block::APPLICATION_LABEL => {
                        if let Some(count) = block::parse_application(&mut r)? {
                            debug!(count, "netscape loop extension");
                            loops = Some(count);
                        }
                    }
                    _ => block::skip_sub_blocks(&mut r)?,
                },
                block::TRAILER => break,
                // stray zero padding between blocks shows up in the wild
                0x00 => continue,
                _ => return Err(DecodeError::InvalidFormat("unrecognized block introducer")),
            }
        }

        if frames.is_empty() {
            return Err(DecodeError::InvalidFormat("no image frames"));
        }

        let loop_count = match loops {
            None | Some(0) => LoopCount::Infinite,
            Some(count) => LoopCount::Finite(count),
        };

        debug!(
            frames = frames.len(),
            width = screen.width,
            height = screen.height,
            ?loop_count,
            "decoded gif"
        );

        Ok(GifImage {
            data,
            global_table: screen.global_table,
            frames,
            size: PixelDimensions {
                x: screen.width as u32,
                y: screen.height as u32,
            },
            loop_count,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Wall-clock time of one full pass over the frames.
    pub fn loop_duration(&self) -> Duration {
        self.frames.iter().map(|frame| frame.delay).sum()
    }
}

fn read_frame(
    r: &mut ByteReader,
    control: Option<block::GraphicControl>,
    config: &Config,
) -> Result<RawFrame, DecodeError> {
    let desc = block::parse_image_descriptor(r)?;

    let min_code_size = r.take_u8()?;
    if !(2..=11).contains(&min_code_size) {
        return Err(DecodeError::InvalidFormat("invalid lzw minimum code size"));
    }
    let data = block::sub_block_span(r)?;

    let control = control.unwrap_or_default();
    Ok(RawFrame {
        data,
        min_code_size,
        left: desc.left,
        top: desc.top,
        width: desc.width,
        height: desc.height,
        interlaced: desc.interlaced,
        local_table: desc.local_table,
        transparent_index: control.transparent_index,
        disposal: control.disposal,
        delay: config.normalize_delay(control.delay_cs),
    })
}
