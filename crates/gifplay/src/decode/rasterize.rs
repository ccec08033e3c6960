//! Turns indexed frame data into full-canvas RGBA images.
//!
//! GIF frames are diffs: each image block covers a sub-rectangle of the
//! logical screen and its disposal method decides what the next frame
//! starts from. Frames therefore only expand correctly in order, so the
//! rasterizer keeps a persistent canvas and replays from frame zero when
//! asked to jump backwards.

use image::{Rgba, RgbaImage};
use tracing::warn;
use weezl::{decode::Decoder as LzwDecoder, BitOrder, LzwStatus};

use super::{Disposal, GifImage, RawFrame};

pub(crate) struct Rasterizer {
    image: GifImage,
    canvas: RgbaImage,
    saved: Option<RgbaImage>,
    next: usize,
}

impl Rasterizer {
    pub(crate) fn new(image: GifImage) -> Self {
        let canvas = RgbaImage::new(image.size.x, image.size.y);
        Rasterizer {
            image,
            canvas,
            saved: None,
            next: 0,
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.canvas = RgbaImage::new(self.image.size.x, self.image.size.y);
        self.saved = None;
        self.next = 0;
    }

    /// The composited frame at `index`, replaying from the start when
    /// asked for anything already passed. Indexes past the end yield the
    /// last frame.
    pub(crate) fn frame_at(&mut self, index: usize) -> RgbaImage {
        if index < self.next {
            self.rewind();
        }
        loop {
            let frame = self.next_frame();
            if self.next > index || self.next >= self.image.frames.len() {
                return frame;
            }
        }
    }

    /// Applies the previous frame's disposal, draws the next image block,
    /// and returns a copy of the canvas.
    ///
    /// Bad pixel data degrades to a partially drawn region rather than
    /// failing; structural problems were already caught at decode time.
    #[profiling::function]
    pub(crate) fn next_frame(&mut self) -> RgbaImage {
        let Some(frame) = self.image.frames.get(self.next).cloned() else {
            return self.canvas.clone();
        };

        if self.next > 0 {
            let prev = self.image.frames[self.next - 1].clone();
            self.dispose(&prev);
        }
        if frame.disposal == Disposal::Previous {
            self.saved = Some(self.canvas.clone());
        }

        self.draw(&frame);
        self.next += 1;
        self.canvas.clone()
    }

    fn dispose(&mut self, prev: &RawFrame) {
        match prev.disposal {
            Disposal::Unspecified | Disposal::Keep => {}
            Disposal::Background => self.clear_region(prev),
            Disposal::Previous => {
                if let Some(saved) = self.saved.take() {
                    self.canvas = saved;
                }
            }
        }
    }

    fn clear_region(&mut self, frame: &RawFrame) {
        let right = (frame.left as u32 + frame.width as u32).min(self.canvas.width());
        let bottom = (frame.top as u32 + frame.height as u32).min(self.canvas.height());
        for y in frame.top as u32..bottom {
            for x in frame.left as u32..right {
                self.canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            }
        }
    }

    fn draw(&mut self, frame: &RawFrame) {
        if frame.width == 0 || frame.height == 0 {
            return;
        }

        let indices = self.expand_lzw(frame);
        let expected = frame.width as usize * frame.height as usize;
        if indices.len() < expected {
            warn!(
                got = indices.len(),
                expected, "frame pixel data ended early"
            );
        }

        let table = frame
            .local_table
            .clone()
            .or_else(|| self.image.global_table.clone());
        let palette: &[u8] = match &table {
            Some(range) => &self.image.data[range.clone()],
            None => &[],
        };

        let (canvas_w, canvas_h) = self.canvas.dimensions();
        for (i, &index) in indices.iter().enumerate() {
            if frame.transparent_index == Some(index) {
                continue;
            }

            let row = i / frame.width as usize;
            let logical_row = if frame.interlaced {
                interlaced_row(row, frame.height as usize)
            } else {
                row
            };
            let x = frame.left as u32 + (i % frame.width as usize) as u32;
            let y = frame.top as u32 + logical_row as u32;
            if x >= canvas_w || y >= canvas_h {
                continue;
            }

            let Some(rgb) = palette_entry(palette, index) else {
                continue;
            };
            self.canvas
                .put_pixel(x, y, Rgba([rgb[0], rgb[1], rgb[2], 0xFF]));
        }
    }

    /// Runs the frame's sub-blocks through the LZW decoder, stopping at
    /// the expected pixel count. Trailing or corrupt data is dropped.
    fn expand_lzw(&self, frame: &RawFrame) -> Vec<u8> {
        let expected = frame.width as usize * frame.height as usize;
        let data = &self.image.data[frame.data.clone()];

        let mut indices = Vec::with_capacity(expected);
        let mut decoder = LzwDecoder::new(BitOrder::Lsb, frame.min_code_size);
        let mut out = [0u8; 2048];

        let mut pos = 0;
        'blocks: while pos < data.len() {
            let len = data[pos] as usize;
            pos += 1;
            if len == 0 {
                break;
            }
            let Some(block) = data.get(pos..pos + len) else {
                break;
            };
            pos += len;

            let mut consumed = 0;
            while consumed < block.len() {
                let result = decoder.decode_bytes(&block[consumed..], &mut out);
                consumed += result.consumed_in;
                indices.extend_from_slice(&out[..result.consumed_out]);
                if indices.len() >= expected {
                    break 'blocks;
                }
                match result.status {
                    Ok(LzwStatus::Ok) => {
                        if result.consumed_in == 0 && result.consumed_out == 0 {
                            break 'blocks;
                        }
                    }
                    Ok(LzwStatus::NoProgress) | Ok(LzwStatus::Done) => break 'blocks,
                    Err(err) => {
                        warn!("lzw error in frame {}: {:?}", self.next, err);
                        break 'blocks;
                    }
                }
            }
        }

        indices.truncate(expected);
        indices
    }
}

// Four-pass interlacing: every 8th row from 0, every 8th from 4, every
// 4th from 2, then the odd rows.
fn interlaced_row(row: usize, height: usize) -> usize {
    const PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

    let mut remaining = row;
    for &(start, step) in &PASSES {
        let rows_in_pass = (height + step - 1 - start) / step;
        if remaining < rows_in_pass {
            return start + remaining * step;
        }
        remaining -= rows_in_pass;
    }
    row
}

fn palette_entry(palette: &[u8], index: u8) -> Option<&[u8]> {
    let at = index as usize * 3;
    palette.get(at..at + 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testgif::{FrameSpec, GifBuilder, PALETTE};

    fn rasterizer(data: Vec<u8>) -> Rasterizer {
        Rasterizer::new(GifImage::decode(data).unwrap())
    }

    fn rgba(entry: [u8; 3]) -> Rgba<u8> {
        Rgba([entry[0], entry[1], entry[2], 0xFF])
    }

    #[test]
    fn solid_frame_expands() {
        let data = GifBuilder::new(3, 2)
            .frame(FrameSpec::solid(2, 3, 2, 10))
            .build();
        let canvas = rasterizer(data).next_frame();

        assert_eq!(canvas.dimensions(), (3, 2));
        for pixel in canvas.pixels() {
            assert_eq!(pixel, &rgba(PALETTE[2]));
        }
    }

    #[test]
    fn sub_rectangle_composites_over_previous_frame() {
        let mut patch = FrameSpec::solid(3, 1, 1, 10);
        patch.rect = (1, 1, 1, 1);
        let data = GifBuilder::new(2, 2)
            .frame(FrameSpec::solid(1, 2, 2, 10))
            .frame(patch)
            .build();

        let mut raster = rasterizer(data);
        raster.next_frame();
        let second = raster.next_frame();

        assert_eq!(second.get_pixel(0, 0), &rgba(PALETTE[1]));
        assert_eq!(second.get_pixel(1, 0), &rgba(PALETTE[1]));
        assert_eq!(second.get_pixel(1, 1), &rgba(PALETTE[3]));
    }

    #[test]
    fn background_disposal_clears_frame_region() {
        let mut patch = FrameSpec::solid(3, 1, 1, 10);
        patch.rect = (0, 0, 1, 1);
        patch.disposal = 2;
        let mut follow = FrameSpec::solid(2, 1, 1, 10);
        follow.rect = (1, 1, 1, 1);
        let data = GifBuilder::new(2, 2)
            .frame(patch)
            .frame(follow)
            .build();

        let mut raster = rasterizer(data);
        raster.next_frame();
        let second = raster.next_frame();

        // the first frame's region went back to transparent
        assert_eq!(second.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(second.get_pixel(1, 1), &rgba(PALETTE[2]));
    }

    #[test]
    fn previous_disposal_restores_canvas() {
        let mut overlay = FrameSpec::solid(3, 2, 2, 10);
        overlay.disposal = 3;
        let mut last = FrameSpec::solid(2, 1, 1, 10);
        last.rect = (0, 1, 1, 1);
        let data = GifBuilder::new(2, 2)
            .frame(FrameSpec::solid(1, 2, 2, 10))
            .frame(overlay)
            .frame(last)
            .build();

        let mut raster = rasterizer(data);
        raster.next_frame();
        assert_eq!(raster.next_frame().get_pixel(0, 0), &rgba(PALETTE[3]));

        // overlay is gone, base frame shows through under the new patch
        let third = raster.next_frame();
        assert_eq!(third.get_pixel(0, 0), &rgba(PALETTE[1]));
        assert_eq!(third.get_pixel(0, 1), &rgba(PALETTE[2]));
    }

    #[test]
    fn transparent_pixels_leave_canvas_untouched() {
        let mut patch = FrameSpec::solid(0, 2, 2, 10);
        patch.indices = vec![0, 3, 3, 0];
        patch.transparent = Some(0);
        let data = GifBuilder::new(2, 2)
            .frame(FrameSpec::solid(1, 2, 2, 10))
            .frame(patch)
            .build();

        let mut raster = rasterizer(data);
        raster.next_frame();
        let second = raster.next_frame();

        assert_eq!(second.get_pixel(0, 0), &rgba(PALETTE[1]));
        assert_eq!(second.get_pixel(1, 0), &rgba(PALETTE[3]));
        assert_eq!(second.get_pixel(0, 1), &rgba(PALETTE[3]));
        assert_eq!(second.get_pixel(1, 1), &rgba(PALETTE[1]));
    }

    #[test]
    fn interlaced_rows_are_reordered() {
        // storage order for a height-4 interlaced image is rows 0, 2, 1, 3
        let mut spec = FrameSpec::solid(0, 1, 4, 10);
        spec.indices = vec![0, 2, 1, 3];
        spec.interlaced = true;
        let data = GifBuilder::new(1, 4).frame(spec).build();

        let canvas = rasterizer(data).next_frame();
        for row in 0..4u8 {
            assert_eq!(
                canvas.get_pixel(0, row as u32),
                &rgba(PALETTE[row as usize]),
                "row {row}"
            );
        }
    }

    #[test]
    fn frames_clip_to_the_logical_screen() {
        let mut spec = FrameSpec::solid(2, 2, 2, 10);
        spec.rect = (1, 1, 2, 2);
        let data = GifBuilder::new(2, 2).frame(spec).build();

        let canvas = rasterizer(data).next_frame();
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(canvas.get_pixel(1, 1), &rgba(PALETTE[2]));
    }

    #[test]
    fn frame_at_replays_backwards_jumps() {
        let data = GifBuilder::new(2, 2)
            .frame(FrameSpec::solid(0, 2, 2, 10))
            .frame(FrameSpec::solid(1, 2, 2, 10))
            .frame(FrameSpec::solid(2, 2, 2, 10))
            .build();

        let mut raster = rasterizer(data);
        let third = raster.frame_at(2);
        assert_eq!(third.get_pixel(0, 0), &rgba(PALETTE[2]));

        let first = raster.frame_at(0);
        assert_eq!(first.get_pixel(0, 0), &rgba(PALETTE[0]));

        let second = raster.frame_at(1);
        assert_eq!(second.get_pixel(0, 0), &rgba(PALETTE[1]));
    }

    #[test]
    fn short_pixel_data_degrades_without_panic() {
        let mut spec = FrameSpec::solid(1, 4, 4, 10);
        spec.indices.truncate(8);
        let data = GifBuilder::new(4, 4).frame(spec).build();

        let canvas = rasterizer(data).next_frame();
        assert_eq!(canvas.dimensions(), (4, 4));
        assert_eq!(canvas.get_pixel(0, 0), &rgba(PALETTE[1]));
        assert_eq!(canvas.get_pixel(3, 3), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn interlace_mapping_is_a_permutation() {
        for height in [1usize, 2, 3, 4, 5, 8, 9, 16, 33] {
            let mut seen = vec![false; height];
            for row in 0..height {
                let mapped = interlaced_row(row, height);
                assert!(mapped < height, "height {height} row {row}");
                assert!(!seen[mapped], "height {height} row {row} duplicated");
                seen[mapped] = true;
            }
        }
    }
}
