use byteorder::{BigEndian, ByteOrder};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::Mp4BoxError;
use crate::{check_payload, BoxHeader, FullBoxHeader, Mp4Box};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFragmentHeaderBox {
    pub sequence_number: u32,
}

impl MovieFragmentHeaderBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        check_payload(header.fourcc, payload, FullBoxHeader::SIZE + 4)?;

        let _full = FullBoxHeader::read(payload);

        Ok(MovieFragmentHeaderBox {
            sequence_number: BigEndian::read_u32(&payload[4..]),
        })
    }
}

impl Mp4Box for MovieFragmentHeaderBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"mfhd")
    }

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        4
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 4];
        BigEndian::write_u32(&mut contents, self.sequence_number);

        writer.put_slice(&contents);

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(
            w,
            "{:indent$}[mfhd] size={} sequence_number={}",
            "",
            self.size(),
            self.sequence_number
        )
    }
}
