use four_cc::FourCC;

use bytes::BytesMut;

use crate::{BoxHeader, Mp4Box, Mp4BoxError};

use super::{
    decode_children, AnyBox, TrackFragmentBaseMediaDecodeTimeBox, TrackFragmentHeaderBox,
    TrackFragmentRunBox, TrackFragmentSample,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackFragmentBox {
    pub tfhd: TrackFragmentHeaderBox,
    pub base_media_decode_time: Option<TrackFragmentBaseMediaDecodeTimeBox>,
    pub track_runs: Vec<TrackFragmentRunBox>,
    pub others: Vec<AnyBox>,
}

impl TrackFragmentBox {
    /// Skeleton track fragment: header, zeroed decode time, one empty run.
    pub fn new(track_id: u32) -> Self {
        TrackFragmentBox {
            tfhd: TrackFragmentHeaderBox::new(track_id),
            base_media_decode_time: Some(TrackFragmentBaseMediaDecodeTimeBox::new()),
            track_runs: vec![TrackFragmentRunBox::new()],
            others: Vec::new(),
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.track_runs
            .iter()
            .map(|t| t.sample_count() as u64)
            .sum()
    }

    /// Move per-sample fields shared by every sample of every run into the
    /// `tfhd` defaults. A flags column where only the very first sample
    /// differs becomes a default plus `first_sample_flags`. An all-zero
    /// composition-offset column is dropped entirely.
    pub fn optimize_tfhd_trun(&mut self) {
        if self.sample_count() == 0 {
            return;
        }

        if let Some(duration) = uniform_field(&self.track_runs, |s| s.duration) {
            self.tfhd.default_sample_duration = Some(duration);
            for run in &mut self.track_runs {
                for sample in &mut run.samples {
                    sample.duration = None;
                }
            }
        }

        if let Some(size) = uniform_field(&self.track_runs, |s| s.size) {
            self.tfhd.default_sample_size = Some(size);
            for run in &mut self.track_runs {
                for sample in &mut run.samples {
                    sample.size = None;
                }
            }
        }

        if let Some((first, rest)) = split_flags(&self.track_runs) {
            self.tfhd.default_sample_flags = Some(rest);
            for (i, run) in self.track_runs.iter_mut().enumerate() {
                run.first_sample_flags = if i == 0 && first != rest {
                    Some(first)
                } else {
                    None
                };
                for sample in &mut run.samples {
                    sample.flags = None;
                }
            }
        }

        let zero_offsets = self
            .track_runs
            .iter()
            .flat_map(|run| run.samples.iter())
            .all(|s| s.composition_time_offset == Some(0));
        if zero_offsets {
            for run in &mut self.track_runs {
                for sample in &mut run.samples {
                    sample.composition_time_offset = None;
                }
            }
        }
    }

    pub(crate) fn parse(
        header: &BoxHeader,
        start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        let children = decode_children(payload, start_pos + header.header_size)?;

        let mut tfhd = None;
        let mut base_media_decode_time = None;
        let mut track_runs = Vec::new();
        let mut others = Vec::new();

        for child in children {
            match child {
                AnyBox::Tfhd(b) if tfhd.is_none() => tfhd = Some(b),
                AnyBox::Tfdt(b) if base_media_decode_time.is_none() => {
                    base_media_decode_time = Some(b)
                }
                AnyBox::Trun(b) => track_runs.push(b),
                other => others.push(other),
            }
        }

        let tfhd = tfhd.ok_or(Mp4BoxError::MissingBox {
            fourcc: FourCC(*b"tfhd"),
            parent: "traf",
        })?;

        Ok(TrackFragmentBox {
            tfhd,
            base_media_decode_time,
            track_runs,
            others,
        })
    }
}

/// The value carried by every sample of every run, if there is exactly one.
fn uniform_field(
    runs: &[TrackFragmentRunBox],
    field: fn(&TrackFragmentSample) -> Option<u32>,
) -> Option<u32> {
    let mut value = None;

    for run in runs {
        for sample in &run.samples {
            match (value, field(sample)) {
                (_, None) => return None,
                (None, v @ Some(_)) => value = v,
                (Some(a), Some(b)) if a == b => {}
                _ => return None,
            }
        }
    }

    value
}

/// Flags of the leading sample and the value shared by all samples after it,
/// provided every sample carries flags and the trailing ones agree.
fn split_flags(runs: &[TrackFragmentRunBox]) -> Option<(u32, u32)> {
    let mut flags = runs.iter().flat_map(|run| run.samples.iter().map(|s| s.flags));

    let first = flags.next()??;
    let mut rest = first;
    for (i, f) in flags.enumerate() {
        let f = f?;
        if i == 0 {
            rest = f;
        } else if f != rest {
            return None;
        }
    }

    Some((first, rest))
}

impl Mp4Box for TrackFragmentBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"traf")
    }

    fn content_size(&self) -> u64 {
        let mut size = self.tfhd.size();

        if let Some(base_media_decode_time) = &self.base_media_decode_time {
            size += base_media_decode_time.size();
        }

        for trun in &self.track_runs {
            size += trun.size();
        }

        for other in &self.others {
            size += other.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.tfhd.write(writer)?;

        if let Some(base_media_decode_time) = &self.base_media_decode_time {
            base_media_decode_time.write(writer)?;
        }

        for run in &self.track_runs {
            run.write(writer)?;
        }

        for other in &self.others {
            other.write(writer)?;
        }

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(w, "{:indent$}[traf] size={}", "", self.size())?;

        self.tfhd.dump(w, indent + 2)?;
        if let Some(base_media_decode_time) = &self.base_media_decode_time {
            base_media_decode_time.dump(w, indent + 2)?;
        }
        for run in &self.track_runs {
            run.dump(w, indent + 2)?;
        }
        for other in &self.others {
            other.dump(w, indent + 2)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sample;

    fn traf_with_samples(samples: &[Sample]) -> TrackFragmentBox {
        let mut traf = TrackFragmentBox::new(1);
        for s in samples {
            traf.track_runs[0].add_sample(s);
        }
        traf
    }

    fn sample(duration: u32, size: u32, flags: u32, cts: i32) -> Sample {
        Sample {
            flags,
            duration,
            size,
            composition_time_offset: cts,
        }
    }

    #[test]
    fn uniform_fields_move_into_tfhd() {
        let mut traf = traf_with_samples(&[
            sample(100, 4, 0x0200_0000, 0),
            sample(100, 9, 0x0200_0000, 0),
        ]);

        traf.optimize_tfhd_trun();

        assert_eq!(traf.tfhd.default_sample_duration, Some(100));
        assert_eq!(traf.tfhd.default_sample_flags, Some(0x0200_0000));
        // sizes differ, so they stay per sample
        assert_eq!(traf.tfhd.default_sample_size, None);

        let run = &traf.track_runs[0];
        assert!(run.samples.iter().all(|s| s.duration.is_none()));
        assert!(run.samples.iter().all(|s| s.flags.is_none()));
        assert!(run.samples.iter().all(|s| s.composition_time_offset.is_none()));
        assert_eq!(run.samples[0].size, Some(4));
        assert_eq!(run.samples[1].size, Some(9));
        assert_eq!(run.first_sample_flags, None);
    }

    #[test]
    fn leading_sync_sample_becomes_first_sample_flags() {
        let mut traf = traf_with_samples(&[
            sample(10, 1, 0x0200_0000, 0),
            sample(10, 1, 0x0101_0000, 0),
            sample(10, 1, 0x0101_0000, 0),
        ]);

        traf.optimize_tfhd_trun();

        assert_eq!(traf.tfhd.default_sample_flags, Some(0x0101_0000));
        assert_eq!(traf.track_runs[0].first_sample_flags, Some(0x0200_0000));
        assert!(traf.track_runs[0].samples.iter().all(|s| s.flags.is_none()));
    }

    #[test]
    fn nonzero_composition_offsets_survive() {
        let mut traf = traf_with_samples(&[sample(10, 1, 0, 5), sample(10, 1, 0, 0)]);

        traf.optimize_tfhd_trun();

        assert_eq!(
            traf.track_runs[0].samples[0].composition_time_offset,
            Some(5)
        );
    }

    #[test]
    fn optimizing_twice_changes_nothing() {
        let mut traf = traf_with_samples(&[
            sample(100, 4, 0x0200_0000, 0),
            sample(100, 4, 0x0101_0000, 0),
        ]);

        traf.optimize_tfhd_trun();
        let once = traf.clone();
        traf.optimize_tfhd_trun();

        assert_eq!(traf, once);
    }
}
