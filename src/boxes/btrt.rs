use byteorder::{BigEndian, ByteOrder};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::Mp4BoxError;
use crate::{check_payload, BoxHeader, Mp4Box};

use std::mem::size_of;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitRateBox {
    pub buffer_size_db: u32,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
}

impl BitRateBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        check_payload(header.fourcc, payload, 12)?;

        Ok(BitRateBox {
            buffer_size_db: BigEndian::read_u32(payload),
            max_bitrate: BigEndian::read_u32(&payload[4..]),
            avg_bitrate: BigEndian::read_u32(&payload[8..]),
        })
    }
}

impl Mp4Box for BitRateBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"btrt")
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + // bufferSizeDB
        size_of::<u32>() as u64 + // maxBitrate
        size_of::<u32>() as u64 // avgBitrate
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 12];

        BigEndian::write_u32(&mut contents[..], self.buffer_size_db);
        BigEndian::write_u32(&mut contents[4..], self.max_bitrate);
        BigEndian::write_u32(&mut contents[8..], self.avg_bitrate);

        writer.put_slice(&contents);

        Ok(())
    }
}
