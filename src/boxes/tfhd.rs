use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{check_payload, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError};

use std::mem::size_of;

bitflags::bitflags! {
    pub struct TrackFragmentHeaderFlags: u32 {
        const BASE_DATA_OFFSET_PRESENT = 0x000001;
        const SAMPLE_DESCRIPTION_INDEX_PRESENT = 0x000002;
        const DEFAULT_SAMPLE_DURATION_PRESENT = 0x000008;
        const DEFAULT_SAMPLE_SIZE_PRESENT = 0x000010;
        const DEFAULT_SAMPLE_FLAGS_PRESENT = 0x000020;
        const DURATION_IS_EMPTY = 0x010000;
        const DEFAULT_BASE_IS_MOOF = 0x020000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFragmentHeaderBox {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub duration_is_empty: bool,
    pub default_base_is_moof: bool,
}

impl TrackFragmentHeaderBox {
    /// A fresh header for a fragment being assembled. Run offsets are
    /// relative to the start of the enclosing moof.
    pub fn new(track_id: u32) -> Self {
        TrackFragmentHeaderBox {
            track_id,
            base_data_offset: None,
            sample_description_index: None,
            default_sample_duration: None,
            default_sample_size: None,
            default_sample_flags: None,
            duration_is_empty: false,
            default_base_is_moof: true,
        }
    }

    fn flags_from_fields(&self) -> TrackFragmentHeaderFlags {
        let mut flags = TrackFragmentHeaderFlags::empty();

        if self.base_data_offset.is_some() {
            flags.insert(TrackFragmentHeaderFlags::BASE_DATA_OFFSET_PRESENT);
        }

        if self.sample_description_index.is_some() {
            flags.insert(TrackFragmentHeaderFlags::SAMPLE_DESCRIPTION_INDEX_PRESENT);
        }

        if self.default_sample_duration.is_some() {
            flags.insert(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_DURATION_PRESENT);
        }

        if self.default_sample_size.is_some() {
            flags.insert(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_SIZE_PRESENT);
        }

        if self.default_sample_flags.is_some() {
            flags.insert(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_FLAGS_PRESENT);
        }

        if self.duration_is_empty {
            flags.insert(TrackFragmentHeaderFlags::DURATION_IS_EMPTY);
        }

        if self.default_base_is_moof {
            flags.insert(TrackFragmentHeaderFlags::DEFAULT_BASE_IS_MOOF);
        }

        flags
    }

    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        crate::check_payload_at_least(header.fourcc, payload, FullBoxHeader::SIZE + 4)?;

        let full = FullBoxHeader::read(payload);
        let flags = TrackFragmentHeaderFlags::from_bits_truncate(full.flags);

        let mut expected = FullBoxHeader::SIZE + 4;
        if flags.contains(TrackFragmentHeaderFlags::BASE_DATA_OFFSET_PRESENT) {
            expected += 8;
        }
        if flags.contains(TrackFragmentHeaderFlags::SAMPLE_DESCRIPTION_INDEX_PRESENT) {
            expected += 4;
        }
        if flags.contains(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_DURATION_PRESENT) {
            expected += 4;
        }
        if flags.contains(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_SIZE_PRESENT) {
            expected += 4;
        }
        if flags.contains(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_FLAGS_PRESENT) {
            expected += 4;
        }
        check_payload(header.fourcc, payload, expected)?;

        let track_id = BigEndian::read_u32(&payload[4..]);
        let mut at = 8usize;

        let base_data_offset = if flags.contains(TrackFragmentHeaderFlags::BASE_DATA_OFFSET_PRESENT)
        {
            let v = BigEndian::read_u64(&payload[at..]);
            at += 8;
            Some(v)
        } else {
            None
        };

        let mut read_u32_field = |present: bool| {
            if present {
                let v = BigEndian::read_u32(&payload[at..]);
                at += 4;
                Some(v)
            } else {
                None
            }
        };

        let sample_description_index = read_u32_field(
            flags.contains(TrackFragmentHeaderFlags::SAMPLE_DESCRIPTION_INDEX_PRESENT),
        );
        let default_sample_duration = read_u32_field(
            flags.contains(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_DURATION_PRESENT),
        );
        let default_sample_size =
            read_u32_field(flags.contains(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_SIZE_PRESENT));
        let default_sample_flags =
            read_u32_field(flags.contains(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_FLAGS_PRESENT));

        Ok(TrackFragmentHeaderBox {
            track_id,
            base_data_offset,
            sample_description_index,
            default_sample_duration,
            default_sample_size,
            default_sample_flags,
            duration_is_empty: flags.contains(TrackFragmentHeaderFlags::DURATION_IS_EMPTY),
            default_base_is_moof: flags.contains(TrackFragmentHeaderFlags::DEFAULT_BASE_IS_MOOF),
        })
    }
}

impl Mp4Box for TrackFragmentHeaderBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"tfhd")
    }

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, self.flags_from_fields().bits()))
    }

    fn content_size(&self) -> u64 {
        let mut size = size_of::<u32>() as u64; // track_ID

        if self.base_data_offset.is_some() {
            size += size_of::<u64>() as u64;
        }

        if self.sample_description_index.is_some() {
            size += size_of::<u32>() as u64;
        }

        if self.default_sample_duration.is_some() {
            size += size_of::<u32>() as u64;
        }

        if self.default_sample_size.is_some() {
            size += size_of::<u32>() as u64;
        }

        if self.default_sample_flags.is_some() {
            size += size_of::<u32>() as u64;
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.write_u32::<BigEndian>(self.track_id)?;

        if let Some(base_data_offset) = self.base_data_offset {
            v.write_u64::<BigEndian>(base_data_offset)?;
        }

        if let Some(sample_description_index) = self.sample_description_index {
            v.write_u32::<BigEndian>(sample_description_index)?;
        }

        if let Some(default_sample_duration) = self.default_sample_duration {
            v.write_u32::<BigEndian>(default_sample_duration)?;
        }

        if let Some(default_sample_size) = self.default_sample_size {
            v.write_u32::<BigEndian>(default_sample_size)?;
        }

        if let Some(default_sample_flags) = self.default_sample_flags {
            v.write_u32::<BigEndian>(default_sample_flags)?;
        }

        writer.put_slice(&v);

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(
            w,
            "{:indent$}[tfhd] size={} track_id={}",
            "",
            self.size(),
            self.track_id
        )
    }
}
