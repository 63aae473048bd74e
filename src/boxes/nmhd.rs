use four_cc::FourCC;

use bytes::BytesMut;

use crate::Mp4BoxError;
use crate::{check_payload, BoxHeader, FullBoxHeader, Mp4Box};

/// Null media header, used by tracks with no audio/video-specific header
/// (subtitle tracks in particular).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullMediaHeaderBox {
    pub version: u8,
    pub flags: u32,
}

impl NullMediaHeaderBox {
    pub fn new() -> Self {
        NullMediaHeaderBox {
            version: 0,
            flags: 0,
        }
    }

    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        check_payload(header.fourcc, payload, FullBoxHeader::SIZE)?;

        let full = FullBoxHeader::read(payload);

        Ok(NullMediaHeaderBox {
            version: full.version,
            flags: full.flags,
        })
    }
}

impl Default for NullMediaHeaderBox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4Box for NullMediaHeaderBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"nmhd")
    }

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.version, self.flags))
    }

    fn content_size(&self) -> u64 {
        0
    }

    fn write_box_contents(&self, _writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        Ok(())
    }
}
