use four_cc::FourCC;

use bytes::BytesMut;

use crate::{BoxHeader, Mp4Box, Mp4BoxError};

use super::{decode_children, AnyBox, MovieFragmentHeaderBox, TrackFragmentBox};

/// Movie fragment container. `start_pos` is the absolute offset of the box
/// in the stream it was decoded from; run offsets with `default_base_is_moof`
/// are resolved against it.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieFragmentBox {
    pub mfhd: MovieFragmentHeaderBox,
    pub trafs: Vec<TrackFragmentBox>,
    pub others: Vec<AnyBox>,
    pub start_pos: u64,
}

impl MovieFragmentBox {
    pub fn first_traf(&self) -> Option<&TrackFragmentBox> {
        self.trafs.first()
    }

    pub fn first_traf_mut(&mut self) -> Option<&mut TrackFragmentBox> {
        self.trafs.first_mut()
    }

    pub fn traf_for_track(&self, track_id: u32) -> Option<&TrackFragmentBox> {
        self.trafs.iter().find(|t| t.tfhd.track_id == track_id)
    }

    pub fn traf_for_track_mut(&mut self, track_id: u32) -> Option<&mut TrackFragmentBox> {
        self.trafs.iter_mut().find(|t| t.tfhd.track_id == track_id)
    }

    pub(crate) fn parse(
        header: &BoxHeader,
        start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        let children = decode_children(payload, start_pos + header.header_size)?;

        let mut mfhd = None;
        let mut trafs = Vec::new();
        let mut others = Vec::new();

        for child in children {
            match child {
                AnyBox::Mfhd(b) if mfhd.is_none() => mfhd = Some(b),
                AnyBox::Traf(b) => trafs.push(b),
                other => others.push(other),
            }
        }

        let mfhd = mfhd.ok_or(Mp4BoxError::MissingBox {
            fourcc: FourCC(*b"mfhd"),
            parent: "moof",
        })?;

        if trafs.is_empty() {
            return Err(Mp4BoxError::MissingBox {
                fourcc: FourCC(*b"traf"),
                parent: "moof",
            });
        }

        Ok(MovieFragmentBox {
            mfhd,
            trafs,
            others,
            start_pos,
        })
    }
}

impl Mp4Box for MovieFragmentBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"moof")
    }

    fn content_size(&self) -> u64 {
        let mut size = self.mfhd.size();

        for traf in &self.trafs {
            size += traf.size();
        }

        for other in &self.others {
            size += other.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.mfhd.write(writer)?;

        for traf in &self.trafs {
            traf.write(writer)?;
        }

        for other in &self.others {
            other.write(writer)?;
        }

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(w, "{:indent$}[moof] size={}", "", self.size())?;

        self.mfhd.dump(w, indent + 2)?;
        for traf in &self.trafs {
            traf.dump(w, indent + 2)?;
        }
        for other in &self.others {
            other.dump(w, indent + 2)?;
        }

        Ok(())
    }
}
