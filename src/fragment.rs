use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};
use four_cc::FourCC;
use tracing::debug;

use crate::{
    decode_box, AnyBox, FullSample, MediaDataBox, MovieFragmentBox, MovieFragmentHeaderBox,
    Mp4Box, Mp4BoxError, ProducerReferenceTimeBox, Sample, TrackExtendsBox, TrackFragmentBox,
    TrackFragmentRunBox,
};

/// One streaming-MP4 fragment: an optional `prft`, a `moof`, and the `mdat`
/// its track runs address. Owns its boxes; the typed fields are the only
/// copies.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub prft: Option<ProducerReferenceTimeBox>,
    pub moof: MovieFragmentBox,
    pub mdat: MediaDataBox,
    /// Unrecognized top-level boxes, re-encoded after the mdat.
    pub others: Vec<AnyBox>,
}

impl Fragment {
    /// Empty single-track fragment skeleton.
    pub fn create(sequence_number: u32, track_id: u32) -> Fragment {
        Self::create_multi_track(sequence_number, &[track_id])
    }

    /// Empty fragment skeleton with one track fragment per track id.
    pub fn create_multi_track(sequence_number: u32, track_ids: &[u32]) -> Fragment {
        debug!(sequence_number, ?track_ids, "creating fragment skeleton");

        Fragment {
            prft: None,
            moof: MovieFragmentBox {
                mfhd: MovieFragmentHeaderBox { sequence_number },
                trafs: track_ids
                    .iter()
                    .map(|&track_id| TrackFragmentBox::new(track_id))
                    .collect(),
                others: Vec::new(),
                start_pos: 0,
            },
            mdat: MediaDataBox::new(),
            others: Vec::new(),
        }
    }

    /// Read top-level boxes to the end of the stream and assemble them into
    /// a fragment.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Fragment, Mp4BoxError> {
        let mut pos = 0u64;

        let mut prft = None;
        let mut moof: Option<MovieFragmentBox> = None;
        let mut mdat: Option<MediaDataBox> = None;
        let mut others = Vec::new();

        while let Some((parsed, consumed)) = decode_box(reader, pos)? {
            pos += consumed;

            match parsed {
                AnyBox::Prft(b) if prft.is_none() => prft = Some(b),
                AnyBox::Moof(b) => {
                    if moof.is_some() {
                        return Err(Mp4BoxError::MalformedBox {
                            fourcc: FourCC(*b"moof"),
                            reason: "fragment contains more than one moof box".into(),
                        });
                    }
                    moof = Some(b);
                }
                AnyBox::Mdat(b) => {
                    if mdat.is_some() {
                        return Err(Mp4BoxError::MalformedBox {
                            fourcc: FourCC(*b"mdat"),
                            reason: "fragment contains more than one mdat box".into(),
                        });
                    }
                    mdat = Some(b);
                }
                other => others.push(other),
            }
        }

        let moof = moof.ok_or(Mp4BoxError::MissingBox {
            fourcc: FourCC(*b"moof"),
            parent: "fragment",
        })?;
        let mdat = mdat.ok_or(Mp4BoxError::MissingBox {
            fourcc: FourCC(*b"mdat"),
            parent: "fragment",
        })?;

        debug!(
            sequence_number = moof.mfhd.sequence_number,
            tracks = moof.trafs.len(),
            mdat_len = mdat.data.len(),
            "decoded fragment"
        );

        Ok(Fragment {
            prft,
            moof,
            mdat,
            others,
        })
    }

    /// Flatten the fragment's sample table for one track.
    ///
    /// With a `trex` the matching track fragment is used and a missing one
    /// just yields no samples; without it the first track fragment is
    /// resolved. Per-sample values fall back per-field from the run entry to
    /// the `tfhd` default, the `trex` default, then zero. The run's
    /// `first_sample_flags` sits between the per-sample flags and the
    /// defaults for the leading sample.
    pub fn get_full_samples(
        &self,
        trex: Option<&TrackExtendsBox>,
    ) -> Result<Vec<FullSample>, Mp4BoxError> {
        let moof = &self.moof;
        let mdat = &self.mdat;

        let traf = match trex {
            Some(trex) => match moof.traf_for_track(trex.track_id) {
                Some(traf) => traf,
                // The track simply has no samples in this fragment.
                None => return Ok(Vec::new()),
            },
            None => moof.first_traf().ok_or(Mp4BoxError::MissingBox {
                fourcc: FourCC(*b"traf"),
                parent: "moof",
            })?,
        };

        let tfhd = &traf.tfhd;
        let payload_len = mdat.data.len() as u64;
        let mut base_time = traf
            .base_media_decode_time
            .as_ref()
            .map(|t| t.base_media_decode_time)
            .unwrap_or(0);

        let mut samples = Vec::new();
        for run in &traf.track_runs {
            let mut base_offset = 0u64;
            if let Some(base_data_offset) = tfhd.base_data_offset {
                base_offset = base_data_offset;
            } else if tfhd.default_base_is_moof {
                base_offset = moof.start_pos;
            }
            if let Some(data_offset) = run.data_offset {
                base_offset = (base_offset as i64 + data_offset as i64) as u64;
            }

            let relative = base_offset as i64 - mdat.payload_absolute_offset() as i64;
            if relative < 0 || relative as u64 > payload_len {
                return Err(Mp4BoxError::OffsetOutOfRange {
                    offset: relative,
                    payload_len,
                });
            }
            let mut offset = relative as u64;

            let mut total_duration = 0u64;
            for (i, entry) in run.samples.iter().enumerate() {
                let duration = entry
                    .duration
                    .or(tfhd.default_sample_duration)
                    .or(trex.map(|x| x.default_sample_duration))
                    .unwrap_or(0);
                let size = entry
                    .size
                    .or(tfhd.default_sample_size)
                    .or(trex.map(|x| x.default_sample_size))
                    .unwrap_or(0);
                let first_flags = if i == 0 { run.first_sample_flags } else { None };
                let flags = entry
                    .flags
                    .or(first_flags)
                    .or(tfhd.default_sample_flags)
                    .or(trex.map(|x| x.default_sample_flags))
                    .unwrap_or(0);
                let composition_time_offset = entry.composition_time_offset.unwrap_or(0);

                let end = offset + size as u64;
                if end > payload_len {
                    return Err(Mp4BoxError::OffsetOutOfRange {
                        offset: end as i64,
                        payload_len,
                    });
                }

                samples.push(FullSample {
                    sample: Sample {
                        flags,
                        duration,
                        size,
                        composition_time_offset,
                    },
                    decode_time: base_time + total_duration,
                    data: Bytes::copy_from_slice(&mdat.data[offset as usize..end as usize]),
                });

                offset = end;
                total_duration += duration as u64;
            }

            // The next run in this track fragment starts where this one ended.
            base_time += total_duration;
        }

        Ok(samples)
    }

    /// Append a sample to the fragment's first track.
    pub fn add_full_sample(&mut self, sample: &FullSample) -> Result<(), Mp4BoxError> {
        let track_id = self
            .moof
            .first_traf()
            .map(|t| t.tfhd.track_id)
            .ok_or(Mp4BoxError::MissingBox {
                fourcc: FourCC(*b"traf"),
                parent: "moof",
            })?;

        self.add_full_sample_to_track(sample, track_id)
    }

    /// Append a sample to the current run of the given track. The track's
    /// first sample also anchors its `tfdt`.
    pub fn add_full_sample_to_track(
        &mut self,
        sample: &FullSample,
        track_id: u32,
    ) -> Result<(), Mp4BoxError> {
        let traf = self
            .moof
            .traf_for_track_mut(track_id)
            .ok_or(Mp4BoxError::UnknownTrack(track_id))?;

        if traf.sample_count() == 0 {
            traf.base_media_decode_time
                .get_or_insert_with(Default::default)
                .set_base_media_decode_time(sample.decode_time);
        }

        if traf.track_runs.is_empty() {
            traf.track_runs.push(TrackFragmentRunBox::new());
        }
        if let Some(run) = traf.track_runs.last_mut() {
            run.add_sample(&sample.sample);
        }

        self.mdat.add_sample_data(&sample.data);

        Ok(())
    }

    /// Start a fresh run on the given track; samples added afterwards land
    /// in it.
    pub fn start_new_trun_for_track(&mut self, track_id: u32) -> Result<(), Mp4BoxError> {
        let traf = self
            .moof
            .traf_for_track_mut(track_id)
            .ok_or(Mp4BoxError::UnknownTrack(track_id))?;

        traf.track_runs.push(TrackFragmentRunBox::new());

        Ok(())
    }

    /// Optimize and write the fragment as `[prft] moof mdat`.
    pub fn encode<W: Write>(&mut self, writer: &mut W) -> Result<(), Mp4BoxError> {
        let buf = self.encode_to_bytes()?;
        writer.write_all(&buf)?;

        Ok(())
    }

    /// Optimize and serialize the fragment.
    pub fn encode_to_bytes(&mut self) -> Result<Bytes, Mp4BoxError> {
        self.prepare_for_encode();

        let mut buf = BytesMut::new();

        if let Some(prft) = &self.prft {
            prft.write(&mut buf)?;
        }
        self.moof.write(&mut buf)?;
        self.mdat.write(&mut buf)?;
        for other in &self.others {
            other.write(&mut buf)?;
        }

        Ok(buf.freeze())
    }

    /// Rebalance `tfhd` defaults against per-sample run fields for the
    /// primary track, then point every run's `data_offset` at its slice of
    /// the mdat payload.
    fn prepare_for_encode(&mut self) {
        if let Some(traf) = self.moof.first_traf_mut() {
            traf.optimize_tfhd_trun();
        }

        // Offsets are patched for every run that is not anchored by an
        // explicit base_data_offset. Force the field present first so box
        // sizes are final before moof.size() is taken.
        for traf in &mut self.moof.trafs {
            if traf.tfhd.base_data_offset.is_some() {
                continue;
            }
            for run in &mut traf.track_runs {
                run.data_offset = Some(0);
            }
        }

        let prft_size = self.prft.as_ref().map(|p| p.size()).unwrap_or(0);
        let moof_size = self.moof.size();

        // Re-anchor the boxes at their positions in the stream about to be
        // written, so the fragment also resolves consistently in memory.
        self.moof.start_pos = prft_size;
        self.mdat.set_position(prft_size + moof_size);

        let mdat_header = self.mdat.payload_absolute_offset() - (prft_size + moof_size);
        let moof_to_payload = moof_size + mdat_header;

        let mut consumed = 0u64;
        for traf in &mut self.moof.trafs {
            let default_sample_size = traf.tfhd.default_sample_size;
            let anchored = traf.tfhd.base_data_offset.is_some();
            let base = if traf.tfhd.default_base_is_moof {
                moof_to_payload
            } else {
                prft_size + moof_to_payload
            };

            for run in &mut traf.track_runs {
                if !anchored {
                    run.data_offset = Some((base + consumed) as i32);
                }
                consumed += run.total_sample_size(default_sample_size);
            }
        }
    }

    /// Write one line per box, children indented.
    pub fn dump<W: io::Write>(&self, w: &mut W, indent: usize) -> io::Result<()> {
        if let Some(prft) = &self.prft {
            prft.dump(w, indent)?;
        }
        self.moof.dump(w, indent)?;
        self.mdat.dump(w, indent)?;
        for other in &self.others {
            other.dump(w, indent)?;
        }

        Ok(())
    }
}
