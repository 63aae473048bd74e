use byteorder::{BigEndian, ByteOrder};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::Mp4BoxError;
use crate::{check_payload, BoxHeader, FullBoxHeader, Mp4Box};

use std::mem::size_of;

/// Base media decode time of a track fragment. Version 0 carries a 32-bit
/// time, version 1 a 64-bit one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFragmentBaseMediaDecodeTimeBox {
    pub version: u8,
    pub base_media_decode_time: u64,
}

impl TrackFragmentBaseMediaDecodeTimeBox {
    pub fn new() -> Self {
        TrackFragmentBaseMediaDecodeTimeBox {
            version: 0,
            base_media_decode_time: 0,
        }
    }

    /// Set the decode time, widening to the 64-bit layout when needed.
    pub fn set_base_media_decode_time(&mut self, time: u64) {
        if time > u32::MAX as u64 {
            self.version = 1;
        }
        self.base_media_decode_time = time;
    }

    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        check_payload_version(header, payload)?;

        let full = FullBoxHeader::read(payload);
        let base_media_decode_time = match full.version {
            0 => BigEndian::read_u32(&payload[4..]) as u64,
            1 => BigEndian::read_u64(&payload[4..]),
            _ => unreachable!(),
        };

        Ok(TrackFragmentBaseMediaDecodeTimeBox {
            version: full.version,
            base_media_decode_time,
        })
    }
}

fn check_payload_version(header: &BoxHeader, payload: &[u8]) -> Result<(), Mp4BoxError> {
    crate::check_payload_at_least(header.fourcc, payload, FullBoxHeader::SIZE)?;

    let version = payload[0];
    match version {
        0 => check_payload(header.fourcc, payload, FullBoxHeader::SIZE + 4),
        1 => check_payload(header.fourcc, payload, FullBoxHeader::SIZE + 8),
        _ => Err(Mp4BoxError::UnsupportedVersion {
            fourcc: header.fourcc,
            version,
        }),
    }
}

impl Default for TrackFragmentBaseMediaDecodeTimeBox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4Box for TrackFragmentBaseMediaDecodeTimeBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"tfdt")
    }

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.version, 0))
    }

    fn content_size(&self) -> u64 {
        match self.version {
            0 => size_of::<u32>() as u64,
            _ => size_of::<u64>() as u64,
        }
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        match self.version {
            0 => {
                let mut content = [0u8; 4];
                BigEndian::write_u32(&mut content[..], self.base_media_decode_time as u32);
                writer.put_slice(&content);
            }
            _ => {
                let mut content = [0u8; 8];
                BigEndian::write_u64(&mut content[..], self.base_media_decode_time);
                writer.put_slice(&content);
            }
        }

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(
            w,
            "{:indent$}[tfdt] size={} base_media_decode_time={}",
            "",
            self.size(),
            self.base_media_decode_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::tests::encode_then_parse;

    #[test]
    fn version_is_widened_for_large_times() {
        let mut tfdt = TrackFragmentBaseMediaDecodeTimeBox::new();
        tfdt.set_base_media_decode_time(1000);
        assert_eq!(tfdt.version, 0);
        assert_eq!(tfdt.size(), 16);

        tfdt.set_base_media_decode_time(u32::MAX as u64 + 1);
        assert_eq!(tfdt.version, 1);
        assert_eq!(tfdt.size(), 20);
    }

    #[test]
    fn roundtrip_both_versions() {
        let mut tfdt = TrackFragmentBaseMediaDecodeTimeBox::new();
        tfdt.set_base_media_decode_time(90_000);
        let back = encode_then_parse(&tfdt, |b| match b {
            crate::AnyBox::Tfdt(t) => t,
            other => panic!("unexpected box {:?}", other.fourcc()),
        });
        assert_eq!(back, tfdt);

        tfdt.set_base_media_decode_time(1 << 40);
        let back = encode_then_parse(&tfdt, |b| match b {
            crate::AnyBox::Tfdt(t) => t,
            other => panic!("unexpected box {:?}", other.fourcc()),
        });
        assert_eq!(back, tfdt);
    }

    #[test]
    fn rejects_unknown_version() {
        let payload = [2u8, 0, 0, 0, 0, 0, 0, 0];
        let header = BoxHeader {
            size: 8 + payload.len() as u64,
            fourcc: FourCC(*b"tfdt"),
            uuid: None,
            header_size: 8,
        };
        assert!(matches!(
            TrackFragmentBaseMediaDecodeTimeBox::parse(&header, 0, &payload),
            Err(Mp4BoxError::UnsupportedVersion { version: 2, .. })
        ));
    }
}
