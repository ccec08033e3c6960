//! Builds small GIF byte streams for tests.
//!
//! Frames are described as raw palette indices and compressed with the
//! same LZW implementation the decoder uses, so fixtures stay readable
//! and nothing binary gets checked in.

use weezl::{encode::Encoder, BitOrder};

/// Default global palette: black, red, green, blue.
pub const PALETTE: [[u8; 3]; 4] = [[0, 0, 0], [255, 0, 0], [0, 255, 0], [0, 0, 255]];

pub struct FrameSpec {
    pub indices: Vec<u8>,
    /// left, top, width, height
    pub rect: (u16, u16, u16, u16),
    pub delay_cs: u16,
    /// raw disposal method bits for the graphic control extension
    pub disposal: u8,
    pub transparent: Option<u8>,
    pub interlaced: bool,
    pub local_palette: Option<Vec<[u8; 3]>>,
}

impl FrameSpec {
    /// A full-size frame painted with one palette index.
    pub fn solid(index: u8, width: u16, height: u16, delay_cs: u16) -> Self {
        FrameSpec {
            indices: vec![index; width as usize * height as usize],
            rect: (0, 0, width, height),
            delay_cs,
            disposal: 0,
            transparent: None,
            interlaced: false,
            local_palette: None,
        }
    }
}

pub struct GifBuilder {
    width: u16,
    height: u16,
    global_palette: Option<Vec<[u8; 3]>>,
    loops: Option<u16>,
    frames: Vec<FrameSpec>,
}

impl GifBuilder {
    pub fn new(width: u16, height: u16) -> Self {
        GifBuilder {
            width,
            height,
            global_palette: Some(PALETTE.to_vec()),
            loops: None,
            frames: Vec::new(),
        }
    }

    pub fn palette(mut self, palette: Vec<[u8; 3]>) -> Self {
        self.global_palette = Some(palette);
        self
    }

    pub fn omit_global_table(&mut self) {
        self.global_palette = None;
    }

    /// Writes a Netscape looping extension with this count.
    pub fn loops(mut self, count: u16) -> Self {
        self.loops = Some(count);
        self
    }

    pub fn frame(mut self, spec: FrameSpec) -> Self {
        self.frames.push(spec);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"GIF89a");
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());

        match &self.global_palette {
            Some(palette) => {
                let bits = table_bits(palette.len());
                out.push(0x80 | bits);
                out.push(0); // background index
                out.push(0); // aspect ratio
                write_palette(&mut out, palette, bits);
            }
            None => out.extend_from_slice(&[0, 0, 0]),
        }

        if let Some(count) = self.loops {
            out.extend_from_slice(&[0x21, 0xFF, 11]);
            out.extend_from_slice(b"NETSCAPE2.0");
            out.push(3);
            out.push(1);
            out.extend_from_slice(&count.to_le_bytes());
            out.push(0);
        }

        for frame in &self.frames {
            self.write_frame(&mut out, frame);
        }

        out.push(0x3B);
        out
    }

    fn write_frame(&self, out: &mut Vec<u8>, frame: &FrameSpec) {
        // graphic control extension
        out.extend_from_slice(&[0x21, 0xF9, 4]);
        let mut packed = (frame.disposal & 0x07) << 2;
        if frame.transparent.is_some() {
            packed |= 1;
        }
        out.push(packed);
        out.extend_from_slice(&frame.delay_cs.to_le_bytes());
        out.push(frame.transparent.unwrap_or(0));
        out.push(0);

        // image descriptor
        let (left, top, width, height) = frame.rect;
        out.push(0x2C);
        out.extend_from_slice(&left.to_le_bytes());
        out.extend_from_slice(&top.to_le_bytes());
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());

        let interlace = if frame.interlaced { 0x40 } else { 0 };
        let table = frame.local_palette.as_ref().or(self.global_palette.as_ref());
        let bits = table.map(|palette| table_bits(palette.len())).unwrap_or(0);
        match &frame.local_palette {
            Some(palette) => {
                out.push(0x80 | interlace | bits);
                write_palette(out, palette, bits);
            }
            None => out.push(interlace),
        }

        // pixel data
        let min_code_size = (bits + 1).max(2);
        out.push(min_code_size);
        for chunk in lzw_compress(min_code_size, &frame.indices).chunks(255) {
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
        }
        out.push(0);
    }
}

/// Size bits for the packed color table field: 2^(bits+1) entries.
fn table_bits(len: usize) -> u8 {
    let mut bits = 0u8;
    while (2usize << bits) < len {
        bits += 1;
    }
    bits
}

fn write_palette(out: &mut Vec<u8>, palette: &[[u8; 3]], bits: u8) {
    for entry in palette {
        out.extend_from_slice(entry);
    }
    // pad to the declared power-of-two size
    for _ in palette.len()..(2usize << bits) {
        out.extend_from_slice(&[0, 0, 0]);
    }
}

fn lzw_compress(min_code_size: u8, indices: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut encoder = Encoder::new(BitOrder::Lsb, min_code_size);
    encoder
        .into_stream(&mut compressed)
        .encode_all(indices)
        .status
        .expect("lzw encode");
    compressed
}
