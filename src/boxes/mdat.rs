use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{Mp4Box, Mp4BoxError};

/// Media data. The payload is opaque here; track runs address into it by
/// byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDataBox {
    pub data: Vec<u8>,
    pub start_pos: u64,
    header_size: u64,
}

impl MediaDataBox {
    pub fn new() -> Self {
        MediaDataBox {
            data: Vec::new(),
            start_pos: 0,
            header_size: 8,
        }
    }

    pub(crate) fn from_parts(data: Vec<u8>, start_pos: u64, header_size: u64) -> Self {
        MediaDataBox {
            data,
            start_pos,
            header_size,
        }
    }

    /// Absolute stream offset of the first payload byte.
    pub fn payload_absolute_offset(&self) -> u64 {
        self.start_pos + self.header_size
    }

    pub fn add_sample_data(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Re-anchor the box at `start_pos`, with the header form it will have
    /// when encoded.
    pub(crate) fn set_position(&mut self, start_pos: u64) {
        self.start_pos = start_pos;
        self.header_size = self.size() - self.data.len() as u64;
    }
}

impl Default for MediaDataBox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4Box for MediaDataBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"mdat")
    }

    fn content_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(&self.data);

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(
            w,
            "{:indent$}[mdat] size={} payload={} bytes",
            "",
            self.size(),
            self.data.len()
        )
    }
}
