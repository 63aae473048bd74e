use byteorder::{BigEndian, ByteOrder};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::Mp4BoxError;
use crate::{check_payload, BoxHeader, FullBoxHeader, Mp4Box};

use std::mem::size_of;

/// Producer reference time: pairs an NTP wall-clock timestamp with a media
/// time on one track. Version 1 widens the media time to 64 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReferenceTimeBox {
    pub version: u8,
    pub flags: u32,
    pub reference_track_id: u32,
    pub ntp_timestamp: u64,
    pub media_time: u64,
}

impl ProducerReferenceTimeBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        crate::check_payload_at_least(header.fourcc, payload, FullBoxHeader::SIZE)?;

        let full = FullBoxHeader::read(payload);
        match full.version {
            0 => check_payload(header.fourcc, payload, FullBoxHeader::SIZE + 16)?,
            1 => check_payload(header.fourcc, payload, FullBoxHeader::SIZE + 20)?,
            version => {
                return Err(Mp4BoxError::UnsupportedVersion {
                    fourcc: header.fourcc,
                    version,
                })
            }
        }

        let reference_track_id = BigEndian::read_u32(&payload[4..]);
        let ntp_timestamp = BigEndian::read_u64(&payload[8..]);
        let media_time = match full.version {
            0 => BigEndian::read_u32(&payload[16..]) as u64,
            _ => BigEndian::read_u64(&payload[16..]),
        };

        Ok(ProducerReferenceTimeBox {
            version: full.version,
            flags: full.flags,
            reference_track_id,
            ntp_timestamp,
            media_time,
        })
    }
}

impl Mp4Box for ProducerReferenceTimeBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"prft")
    }

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.version, self.flags))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + // reference_track_ID
        size_of::<u64>() as u64 + // ntp_timestamp
        match self.version {
            0 => size_of::<u32>() as u64,
            _ => size_of::<u64>() as u64,
        }
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 20];

        BigEndian::write_u32(&mut contents[..], self.reference_track_id);
        BigEndian::write_u64(&mut contents[4..], self.ntp_timestamp);

        match self.version {
            0 => {
                BigEndian::write_u32(&mut contents[12..], self.media_time as u32);
                writer.put_slice(&contents[..16]);
            }
            _ => {
                BigEndian::write_u64(&mut contents[12..], self.media_time);
                writer.put_slice(&contents[..20]);
            }
        }

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(
            w,
            "{:indent$}[prft] size={} reference_track_id={} media_time={}",
            "",
            self.size(),
            self.reference_track_id,
            self.media_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::tests::encode_then_parse;

    fn as_prft(b: crate::AnyBox) -> ProducerReferenceTimeBox {
        match b {
            crate::AnyBox::Prft(p) => p,
            other => panic!("unexpected box {:?}", other.fourcc()),
        }
    }

    #[test]
    fn roundtrip_both_versions() {
        let mut prft = ProducerReferenceTimeBox {
            version: 0,
            flags: 0,
            reference_track_id: 1,
            ntp_timestamp: 0xDEAD_BEEF_0000_0001,
            media_time: 90_000,
        };
        assert_eq!(encode_then_parse(&prft, as_prft), prft);

        prft.version = 1;
        prft.media_time = 1 << 40;
        assert_eq!(encode_then_parse(&prft, as_prft), prft);
    }
}
