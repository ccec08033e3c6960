//! Low level readers for the GIF block structure.
//!
//! Everything here works against the original byte buffer and records
//! ranges into it rather than copying data out.

use std::ops::Range;

use crate::decode::Disposal;
use crate::error::DecodeError;

pub(crate) const IMAGE_SEPARATOR: u8 = 0x2C;
pub(crate) const EXTENSION_INTRODUCER: u8 = 0x21;
pub(crate) const TRAILER: u8 = 0x3B;

pub(crate) const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
pub(crate) const APPLICATION_LABEL: u8 = 0xFF;

const NETSCAPE_IDENT: &[u8] = b"NETSCAPE2.0";
const ANIMEXTS_IDENT: &[u8] = b"ANIMEXTS1.0";

/// Bounds-checked cursor over the GIF data.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn take_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.data.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn take_u16_le(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take_slice(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn take_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated)?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take_slice(len).map(|_| ())
    }
}

/// Logical screen descriptor, directly after the header.
#[derive(Debug)]
pub(crate) struct LogicalScreen {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) global_table: Option<Range<usize>>,
}

pub(crate) fn parse_logical_screen(r: &mut ByteReader) -> Result<LogicalScreen, DecodeError> {
    let width = r.take_u16_le()?;
    let height = r.take_u16_le()?;
    let packed = r.take_u8()?;
    r.skip(2)?; // background color index and pixel aspect ratio

    let global_table = if packed & 0x80 != 0 {
        Some(take_color_table(r, packed)?)
    } else {
        None
    };

    Ok(LogicalScreen {
        width,
        height,
        global_table,
    })
}

/// An image block header. The pixel data that follows is left to
/// [`sub_block_span`].
pub(crate) struct ImageDescriptor {
    pub(crate) left: u16,
    pub(crate) top: u16,
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) interlaced: bool,
    pub(crate) local_table: Option<Range<usize>>,
}

pub(crate) fn parse_image_descriptor(r: &mut ByteReader) -> Result<ImageDescriptor, DecodeError> {
    let left = r.take_u16_le()?;
    let top = r.take_u16_le()?;
    let width = r.take_u16_le()?;
    let height = r.take_u16_le()?;
    let packed = r.take_u8()?;

    let interlaced = packed & 0x40 != 0;
    let local_table = if packed & 0x80 != 0 {
        Some(take_color_table(r, packed)?)
    } else {
        None
    };

    Ok(ImageDescriptor {
        left,
        top,
        width,
        height,
        interlaced,
        local_table,
    })
}

/// The low three bits of a packed table flag give the table size as
/// 2^(n+1) entries of three bytes each.
fn take_color_table(r: &mut ByteReader, packed: u8) -> Result<Range<usize>, DecodeError> {
    let entries = 2usize << (packed & 0x07);
    let start = r.pos();
    r.skip(entries * 3)?;
    Ok(start..r.pos())
}

#[derive(Default)]
pub(crate) struct GraphicControl {
    pub(crate) disposal: Disposal,
    pub(crate) delay_cs: u16,
    pub(crate) transparent_index: Option<u8>,
}

pub(crate) fn parse_graphic_control(r: &mut ByteReader) -> Result<GraphicControl, DecodeError> {
    let size = r.take_u8()?;
    if size < 4 {
        return Err(DecodeError::InvalidFormat("graphic control block too short"));
    }
    let body = r.take_slice(size as usize)?;

    let packed = body[0];
    let delay_cs = u16::from_le_bytes([body[1], body[2]]);
    let transparent_index = (packed & 0x01 != 0).then_some(body[3]);

    // the mandatory terminator, plus any oversized trailing data
    skip_sub_blocks(r)?;

    Ok(GraphicControl {
        disposal: Disposal::from_packed(packed),
        delay_cs,
        transparent_index,
    })
}

/// Reads an application extension, returning the loop count when it is
/// one of the Netscape-style looping blocks.
pub(crate) fn parse_application(r: &mut ByteReader) -> Result<Option<u16>, DecodeError> {
    let size = r.take_u8()?;
    let ident = r.take_slice(size as usize)?;
    let looping = ident == NETSCAPE_IDENT || ident == ANIMEXTS_IDENT;

    let mut loops = None;
    loop {
        let len = r.take_u8()?;
        if len == 0 {
            break;
        }
        let body = r.take_slice(len as usize)?;
        if looping && loops.is_none() && len >= 3 && body[0] == 0x01 {
            loops = Some(u16::from_le_bytes([body[1], body[2]]));
        }
    }

    Ok(loops)
}

/// Walks length-prefixed sub-blocks up to and including the terminator.
pub(crate) fn skip_sub_blocks(r: &mut ByteReader) -> Result<(), DecodeError> {
    loop {
        let len = r.take_u8()?;
        if len == 0 {
            return Ok(());
        }
        r.skip(len as usize)?;
    }
}

/// Like [`skip_sub_blocks`], but hands back the span covered, terminator
/// included, so the data can be revisited later without re-parsing.
pub(crate) fn sub_block_span(r: &mut ByteReader) -> Result<Range<usize>, DecodeError> {
    let start = r.pos();
    skip_sub_blocks(r)?;
    Ok(start..r.pos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reports_truncation() {
        let mut r = ByteReader::new(&[1, 2]);
        assert_eq!(r.take_u8().unwrap(), 1);
        assert_eq!(r.take_u16_le(), Err(DecodeError::Truncated));
    }

    #[test]
    fn logical_screen_with_global_table() {
        // 4x2 screen, 2-entry global table
        let data = [4, 0, 2, 0, 0x80, 0, 0, 1, 2, 3, 4, 5, 6];
        let mut r = ByteReader::new(&data);
        let screen = parse_logical_screen(&mut r).unwrap();
        assert_eq!(screen.width, 4);
        assert_eq!(screen.height, 2);
        assert_eq!(screen.global_table, Some(7..13));
        assert!(r.at_end());
    }

    #[test]
    fn logical_screen_without_table() {
        let data = [4, 0, 2, 0, 0x00, 0, 0];
        let mut r = ByteReader::new(&data);
        let screen = parse_logical_screen(&mut r).unwrap();
        assert!(screen.global_table.is_none());
    }

    #[test]
    fn truncated_color_table_is_an_error() {
        let data = [4, 0, 2, 0, 0x81, 0, 0, 1, 2, 3];
        let mut r = ByteReader::new(&data);
        assert_eq!(
            parse_logical_screen(&mut r).unwrap_err(),
            DecodeError::Truncated
        );
    }

    #[test]
    fn sub_block_span_covers_terminator() {
        let data = [2, 0xAA, 0xBB, 1, 0xCC, 0];
        let mut r = ByteReader::new(&data);
        assert_eq!(sub_block_span(&mut r).unwrap(), 0..6);
    }

    #[test]
    fn unterminated_sub_blocks_are_truncated() {
        let data = [2, 0xAA, 0xBB];
        let mut r = ByteReader::new(&data);
        assert_eq!(skip_sub_blocks(&mut r), Err(DecodeError::Truncated));
    }

    #[test]
    fn graphic_control_fields() {
        // disposal 2, transparency on, delay 0x0102, transparent index 7
        let data = [4, 0b0000_1001, 0x02, 0x01, 7, 0];
        let mut r = ByteReader::new(&data);
        let control = parse_graphic_control(&mut r).unwrap();
        assert_eq!(control.disposal, Disposal::Background);
        assert_eq!(control.delay_cs, 0x0102);
        assert_eq!(control.transparent_index, Some(7));
    }

    #[test]
    fn graphic_control_without_transparency() {
        let data = [4, 0b0000_0100, 10, 0, 9, 0];
        let mut r = ByteReader::new(&data);
        let control = parse_graphic_control(&mut r).unwrap();
        assert_eq!(control.disposal, Disposal::Keep);
        assert_eq!(control.transparent_index, None);
    }

    #[test]
    fn netscape_loop_count() {
        let mut data = vec![11];
        data.extend_from_slice(b"NETSCAPE2.0");
        data.extend_from_slice(&[3, 1, 5, 0, 0]);
        let mut r = ByteReader::new(&data);
        assert_eq!(parse_application(&mut r).unwrap(), Some(5));
    }

    #[test]
    fn other_application_extensions_are_skipped() {
        let mut data = vec![11];
        data.extend_from_slice(b"XMP DataXMP");
        data.extend_from_slice(&[2, 0xDE, 0xAD, 0]);
        let mut r = ByteReader::new(&data);
        assert_eq!(parse_application(&mut r).unwrap(), None);
        assert!(r.at_end());
    }
}
