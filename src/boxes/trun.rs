use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use std::mem::size_of;

use crate::{check_payload, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Sample};

const MAX_FIELDLESS_SAMPLES: u32 = 1 << 22;

bitflags::bitflags! {
    pub struct TrackFragmentRunFlags: u32 {
        const DATA_OFFSET_PRESENT = 0x00000001;
        const FIRST_SAMPLE_FLAGS_PRESENT = 0x00000004;
        const SAMPLE_DURATION_PRESENT = 0x00000100;
        const SAMPLE_SIZE_PRESENT = 0x00000200;
        const SAMPLE_FLAGS_PRESENT = 0x00000400;
        const SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT = 0x00000800;
    }
}

/// One run entry. Absent fields fall back to `tfhd`/`trex` defaults when the
/// run is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFragmentSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFragmentRunBox {
    pub version: u8,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrackFragmentSample>,
}

impl TrackFragmentRunBox {
    /// An empty run ready to receive samples. The data offset is patched
    /// when the fragment is encoded.
    pub fn new() -> Self {
        TrackFragmentRunBox {
            version: 1,
            data_offset: Some(0),
            first_sample_flags: None,
            samples: Vec::new(),
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.samples.len() as u32
    }

    pub fn add_sample(&mut self, sample: &Sample) {
        self.samples.push(TrackFragmentSample {
            duration: Some(sample.duration),
            size: Some(sample.size),
            flags: Some(sample.flags),
            composition_time_offset: Some(sample.composition_time_offset),
        });
    }

    /// Total bytes of media data this run addresses, with absent sample
    /// sizes taken from the given default.
    pub(crate) fn total_sample_size(&self, default_sample_size: Option<u32>) -> u64 {
        self.samples
            .iter()
            .map(|s| s.size.or(default_sample_size).unwrap_or(0) as u64)
            .sum()
    }

    fn sample_size(flags: TrackFragmentRunFlags) -> u64 {
        let mut sample_size = 0;

        if flags.contains(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT) {
            sample_size += 4; // sample_duration
        }

        if flags.contains(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT) {
            sample_size += 4; // sample_size
        }

        if flags.contains(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT) {
            sample_size += 4; // sample_flags
        }

        if flags.contains(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT) {
            sample_size += 4; // sample_composition_time_offset
        }

        sample_size
    }

    fn flags_from_fields(&self) -> TrackFragmentRunFlags {
        let mut flags = TrackFragmentRunFlags::empty();

        if self.data_offset.is_some() {
            flags.insert(TrackFragmentRunFlags::DATA_OFFSET_PRESENT);
        }

        if self.first_sample_flags.is_some() {
            flags.insert(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT);
        }

        if let Some(sample) = self.samples.first() {
            if sample.duration.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT);
            }

            if sample.size.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT);
            }

            if sample.flags.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT);
            }

            if sample.composition_time_offset.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT);
            }
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
        if full.version > 1 {
            return Err(Mp4BoxError::UnsupportedVersion {
                fourcc: header.fourcc,
                version: full.version,
            });
        }

        let flags = TrackFragmentRunFlags::from_bits_truncate(full.flags);
        let sample_count = BigEndian::read_u32(&payload[4..]);

        let mut expected = FullBoxHeader::SIZE + 4;
        if flags.contains(TrackFragmentRunFlags::DATA_OFFSET_PRESENT) {
            expected += 4;
        }
        if flags.contains(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT) {
            expected += 4;
        }
        expected += sample_count as u64 * Self::sample_size(flags);
        check_payload(header.fourcc, payload, expected)?;

        // A run whose entries carry no bytes could declare any count; the
        // count alone is not allowed to drive allocation.
        if Self::sample_size(flags) == 0 && sample_count > MAX_FIELDLESS_SAMPLES {
            return Err(Mp4BoxError::MalformedBox {
                fourcc: header.fourcc,
                reason: format!(
                    "implausible sample_count {sample_count} for a run with no per-sample fields"
                ),
            });
        }

        let mut at = 8usize;

        let data_offset = if flags.contains(TrackFragmentRunFlags::DATA_OFFSET_PRESENT) {
            let v = BigEndian::read_i32(&payload[at..]);
            at += 4;
            Some(v)
        } else {
            None
        };

        let first_sample_flags = if flags.contains(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT)
        {
            let v = BigEndian::read_u32(&payload[at..]);
            at += 4;
            Some(v)
        } else {
            None
        };

        // The header alone is not trusted for the allocation size.
        let mut samples = Vec::with_capacity(sample_count.min(1 << 16) as usize);
        for _ in 0..sample_count {
            let duration = if flags.contains(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT) {
                let v = BigEndian::read_u32(&payload[at..]);
                at += 4;
                Some(v)
            } else {
                None
            };

            let size = if flags.contains(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT) {
                let v = BigEndian::read_u32(&payload[at..]);
                at += 4;
                Some(v)
            } else {
                None
            };

            let sample_flags = if flags.contains(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT) {
                let v = BigEndian::read_u32(&payload[at..]);
                at += 4;
                Some(v)
            } else {
                None
            };

            // Signed in version 1; version 0 values are reinterpreted as
            // signed so both versions resolve the same way.
            let composition_time_offset = if flags
                .contains(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT)
            {
                let v = BigEndian::read_i32(&payload[at..]);
                at += 4;
                Some(v)
            } else {
                None
            };

            samples.push(TrackFragmentSample {
                duration,
                size,
                flags: sample_flags,
                composition_time_offset,
            });
        }

        Ok(TrackFragmentRunBox {
            version: full.version,
            data_offset,
            first_sample_flags,
            samples,
        })
    }
}

impl Default for TrackFragmentRunBox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4Box for TrackFragmentRunBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"trun")
    }

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(
            self.version,
            self.flags_from_fields().bits(),
        ))
    }

    fn content_size(&self) -> u64 {
        let flags = self.flags_from_fields();

        let mut size = 0;

        size += size_of::<u32>() as u64; // sample_count

        if flags.contains(TrackFragmentRunFlags::DATA_OFFSET_PRESENT) {
            size += size_of::<i32>() as u64; // data_offset
        }

        if flags.contains(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT) {
            size += size_of::<u32>() as u64; // first_sample_flags
        }

        size += Self::sample_size(flags) * self.samples.len() as u64;

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.write_u32::<BigEndian>(self.sample_count())?;

        if let Some(data_offset) = self.data_offset {
            v.write_i32::<BigEndian>(data_offset)?;
        }

        if let Some(first_sample_flags) = self.first_sample_flags {
            v.write_u32::<BigEndian>(first_sample_flags)?;
        }

        let flags = self.flags_from_fields();
        for sample in &self.samples {
            ensure_sample_fields_present(sample, flags)?;

            if let Some(duration) = sample.duration {
                v.write_u32::<BigEndian>(duration)?;
            }

            if let Some(size) = sample.size {
                v.write_u32::<BigEndian>(size)?;
            }

            if let Some(flags) = sample.flags {
                v.write_u32::<BigEndian>(flags)?;
            }

            if let Some(composition_time_offset) = sample.composition_time_offset {
                v.write_i32::<BigEndian>(composition_time_offset)?;
            }
        }

        writer.put_slice(&v);

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(
            w,
            "{:indent$}[trun] size={} sample_count={}",
            "",
            self.size(),
            self.sample_count()
        )
    }
}

/// Every sample in a run must carry exactly the fields the run flags
/// announce; the wire layout has no way to express a ragged run.
fn ensure_sample_fields_present(
    sample: &TrackFragmentSample,
    flags: TrackFragmentRunFlags,
) -> Result<(), Mp4BoxError> {
    let consistent = sample.duration.is_some()
        == flags.contains(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT)
        && sample.size.is_some() == flags.contains(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT)
        && sample.flags.is_some() == flags.contains(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT)
        && sample.composition_time_offset.is_some()
            == flags.contains(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT);

    if !consistent {
        return Err(Mp4BoxError::MalformedBox {
            fourcc: FourCC(*b"trun"),
            reason: "sample field presence inconsistent across the run".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::tests::encode_then_parse;

    fn as_trun(b: crate::AnyBox) -> TrackFragmentRunBox {
        match b {
            crate::AnyBox::Trun(t) => t,
            other => panic!("unexpected box {:?}", other.fourcc()),
        }
    }

    #[test]
    fn roundtrip_full_per_sample_fields() {
        let mut trun = TrackFragmentRunBox::new();
        trun.data_offset = Some(-16);
        trun.add_sample(&Sample {
            flags: 0x0200_0000,
            duration: 100,
            size: 4,
            composition_time_offset: -2,
        });
        trun.add_sample(&Sample {
            flags: 0x0101_0000,
            duration: 120,
            size: 6,
            composition_time_offset: 3,
        });

        let back = encode_then_parse(&trun, as_trun);
        assert_eq!(back, trun);
    }

    #[test]
    fn roundtrip_defaults_only_run() {
        let trun = TrackFragmentRunBox {
            version: 0,
            data_offset: Some(256),
            first_sample_flags: Some(0x0200_0000),
            samples: vec![
                TrackFragmentSample {
                    duration: None,
                    size: None,
                    flags: None,
                    composition_time_offset: None,
                };
                3
            ],
        };

        // sample entries carry no bytes at all
        assert_eq!(trun.content_size(), 4 + 4 + 4);
        assert_eq!(encode_then_parse(&trun, as_trun), trun);
    }

    #[test]
    fn ragged_run_is_rejected_on_encode() {
        let mut trun = TrackFragmentRunBox::new();
        trun.add_sample(&Sample {
            flags: 0,
            duration: 10,
            size: 1,
            composition_time_offset: 0,
        });
        trun.samples.push(TrackFragmentSample {
            duration: Some(10),
            size: None,
            flags: Some(0),
            composition_time_offset: Some(0),
        });

        let mut buf = bytes::BytesMut::new();
        assert!(matches!(
            trun.write(&mut buf),
            Err(Mp4BoxError::MalformedBox { .. })
        ));
    }

    #[test]
    fn truncated_sample_table_is_malformed() {
        // declares 2 samples with durations but carries bytes for one
        let mut payload = vec![0u8, 0, 1, 0]; // version 0, duration-present
        payload.extend_from_slice(&2u32.to_be_bytes());
        payload.extend_from_slice(&100u32.to_be_bytes());

        let header = BoxHeader {
            size: 8 + payload.len() as u64,
            fourcc: FourCC(*b"trun"),
            uuid: None,
            header_size: 8,
        };
        assert!(matches!(
            TrackFragmentRunBox::parse(&header, 0, &payload),
            Err(Mp4BoxError::MalformedBox { .. })
        ));
    }
}
