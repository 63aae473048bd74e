mod btrt;
mod mdat;
mod mfhd;
mod moof;
mod nmhd;
mod prft;
mod tfdt;
mod tfhd;
mod traf;
mod trex;
mod trun;
mod unknown;
mod wvtt;

pub use self::{
    btrt::*, mdat::*, mfhd::*, moof::*, nmhd::*, prft::*, tfdt::*, tfhd::*, traf::*, trex::*,
    trun::*, unknown::*, wvtt::*,
};

use std::io::{self, Read};

use bytes::BytesMut;
use four_cc::FourCC;
use tracing::trace;

use crate::{BoxHeader, Mp4Box, Mp4BoxError};

/// The closed set of box types this library understands, plus an opaque
/// carrier for everything else.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyBox {
    Prft(ProducerReferenceTimeBox),
    Moof(MovieFragmentBox),
    Mfhd(MovieFragmentHeaderBox),
    Traf(TrackFragmentBox),
    Tfhd(TrackFragmentHeaderBox),
    Tfdt(TrackFragmentBaseMediaDecodeTimeBox),
    Trun(TrackFragmentRunBox),
    Trex(TrackExtendsBox),
    Mdat(MediaDataBox),
    Wvtt(WebVttSampleEntryBox),
    VttC(WebVttConfigurationBox),
    Vlab(WebVttSourceLabelBox),
    Vtte(VttEmptyCueBox),
    Vttc(VttCueBox),
    Vsid(CueSourceIdBox),
    Iden(CueIdBox),
    Ctim(CueTimeBox),
    Sttg(CueSettingsBox),
    Payl(CuePayloadBox),
    Vtta(VttAdditionalTextBox),
    Nmhd(NullMediaHeaderBox),
    Btrt(BitRateBox),
    Unknown(UnknownBox),
}

macro_rules! each_box {
    ($any:expr, $b:ident => $body:expr) => {
        match $any {
            AnyBox::Prft($b) => $body,
            AnyBox::Moof($b) => $body,
            AnyBox::Mfhd($b) => $body,
            AnyBox::Traf($b) => $body,
            AnyBox::Tfhd($b) => $body,
            AnyBox::Tfdt($b) => $body,
            AnyBox::Trun($b) => $body,
            AnyBox::Trex($b) => $body,
            AnyBox::Mdat($b) => $body,
            AnyBox::Wvtt($b) => $body,
            AnyBox::VttC($b) => $body,
            AnyBox::Vlab($b) => $body,
            AnyBox::Vtte($b) => $body,
            AnyBox::Vttc($b) => $body,
            AnyBox::Vsid($b) => $body,
            AnyBox::Iden($b) => $body,
            AnyBox::Ctim($b) => $body,
            AnyBox::Sttg($b) => $body,
            AnyBox::Payl($b) => $body,
            AnyBox::Vtta($b) => $body,
            AnyBox::Nmhd($b) => $body,
            AnyBox::Btrt($b) => $body,
            AnyBox::Unknown($b) => $body,
        }
    };
}

impl AnyBox {
    pub fn fourcc(&self) -> FourCC {
        each_box!(self, b => b.fourcc())
    }

    /// Total encoded size of the box, header included.
    pub fn size(&self) -> u64 {
        each_box!(self, b => b.size())
    }

    pub fn write(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        each_box!(self, b => b.write(writer))
    }

    pub fn dump<W: io::Write>(&self, w: &mut W, indent: usize) -> io::Result<()> {
        each_box!(self, b => b.dump(w, indent))
    }
}

/// Decode one box from `reader`, which is positioned `start_pos` bytes into
/// the enclosing stream. Returns the box and the bytes consumed, or
/// `Ok(None)` at a clean end of stream.
pub fn decode_box<R: Read>(
    reader: &mut R,
    start_pos: u64,
) -> Result<Option<(AnyBox, u64)>, Mp4BoxError> {
    let header = match BoxHeader::decode(reader)? {
        Some(header) => header,
        None => return Ok(None),
    };

    trace!(fourcc = %header.fourcc, size = header.size, start_pos, "decoding box");

    // `size == 0` means the box extends to the end of the stream, which is
    // only meaningful for a top-level mdat.
    if header.size == 0 {
        if &header.fourcc.0 != b"mdat" {
            return Err(Mp4BoxError::MalformedHeader(format!(
                "'{}' box with size 0; only a top-level mdat may extend to end of stream",
                header.fourcc
            )));
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let consumed = header.header_size + data.len() as u64;
        return Ok(Some((
            AnyBox::Mdat(MediaDataBox::from_parts(
                data,
                start_pos,
                header.header_size,
            )),
            consumed,
        )));
    }

    let payload_len = (header.size - header.header_size) as usize;
    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload)?;

    Ok(Some((parse_payload(&header, start_pos, &payload)?, header.size)))
}

/// Parse one box at the start of `buf`, returning it and the bytes consumed.
pub(crate) fn parse_box_at(buf: &[u8], start_pos: u64) -> Result<(AnyBox, u64), Mp4BoxError> {
    let header = BoxHeader::parse(buf)?;

    if header.size > buf.len() as u64 {
        return Err(Mp4BoxError::SizeMismatch {
            fourcc: header.fourcc,
            overshoot: header.size - buf.len() as u64,
        });
    }

    let payload = &buf[header.header_size as usize..header.size as usize];
    let parsed = parse_payload(&header, start_pos, payload)?;

    Ok((parsed, header.size))
}

/// Decode child boxes until `payload` is exhausted. `start_pos` is the
/// absolute stream offset of the first payload byte.
pub(crate) fn decode_children(payload: &[u8], start_pos: u64) -> Result<Vec<AnyBox>, Mp4BoxError> {
    let mut children = Vec::new();
    let mut pos = 0u64;

    while (pos as usize) < payload.len() {
        let (child, consumed) = parse_box_at(&payload[pos as usize..], start_pos + pos)?;
        children.push(child);
        pos += consumed;
    }

    Ok(children)
}

fn parse_payload(header: &BoxHeader, start_pos: u64, payload: &[u8]) -> Result<AnyBox, Mp4BoxError> {
    if header.uuid.is_some() {
        return Ok(AnyBox::Unknown(UnknownBox::from_parts(header, payload)));
    }

    let parsed = match &header.fourcc.0 {
        b"prft" => AnyBox::Prft(ProducerReferenceTimeBox::parse(header, start_pos, payload)?),
        b"moof" => AnyBox::Moof(MovieFragmentBox::parse(header, start_pos, payload)?),
        b"mfhd" => AnyBox::Mfhd(MovieFragmentHeaderBox::parse(header, start_pos, payload)?),
        b"traf" => AnyBox::Traf(TrackFragmentBox::parse(header, start_pos, payload)?),
        b"tfhd" => AnyBox::Tfhd(TrackFragmentHeaderBox::parse(header, start_pos, payload)?),
        b"tfdt" => AnyBox::Tfdt(TrackFragmentBaseMediaDecodeTimeBox::parse(
            header, start_pos, payload,
        )?),
        b"trun" => AnyBox::Trun(TrackFragmentRunBox::parse(header, start_pos, payload)?),
        b"trex" => AnyBox::Trex(TrackExtendsBox::parse(header, start_pos, payload)?),
        b"mdat" => AnyBox::Mdat(MediaDataBox::from_parts(
            payload.to_vec(),
            start_pos,
            header.header_size,
        )),
        b"wvtt" => AnyBox::Wvtt(WebVttSampleEntryBox::parse(header, start_pos, payload)?),
        b"vttC" => AnyBox::VttC(WebVttConfigurationBox::parse(header, start_pos, payload)?),
        b"vlab" => AnyBox::Vlab(WebVttSourceLabelBox::parse(header, start_pos, payload)?),
        b"vtte" => AnyBox::Vtte(VttEmptyCueBox::parse(header, start_pos, payload)?),
        b"vttc" => AnyBox::Vttc(VttCueBox::parse(header, start_pos, payload)?),
        b"vsid" => AnyBox::Vsid(CueSourceIdBox::parse(header, start_pos, payload)?),
        b"iden" => AnyBox::Iden(CueIdBox::parse(header, start_pos, payload)?),
        b"ctim" => AnyBox::Ctim(CueTimeBox::parse(header, start_pos, payload)?),
        b"sttg" => AnyBox::Sttg(CueSettingsBox::parse(header, start_pos, payload)?),
        b"payl" => AnyBox::Payl(CuePayloadBox::parse(header, start_pos, payload)?),
        b"vtta" => AnyBox::Vtta(VttAdditionalTextBox::parse(header, start_pos, payload)?),
        b"nmhd" => AnyBox::Nmhd(NullMediaHeaderBox::parse(header, start_pos, payload)?),
        b"btrt" => AnyBox::Btrt(BitRateBox::parse(header, start_pos, payload)?),
        _ => AnyBox::Unknown(UnknownBox::from_parts(header, payload)),
    };

    Ok(parsed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Mp4Box;

    /// Write a box and decode it back, asserting size agreement on the way.
    pub(crate) fn encode_then_parse<B: Mp4Box, T>(
        boks: &B,
        extract: impl FnOnce(AnyBox) -> T,
    ) -> T {
        let mut buf = BytesMut::new();
        boks.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, boks.size());

        let (parsed, consumed) = parse_box_at(&buf, 0).unwrap();
        assert_eq!(consumed, boks.size());

        extract(parsed)
    }

    #[test]
    fn unknown_box_roundtrips_byte_exactly() {
        let raw = {
            let mut v = vec![0, 0, 0, 13, b'a', b'b', b'c', b'd'];
            v.extend_from_slice(&[1, 2, 3, 4, 5]);
            v
        };

        let (parsed, consumed) = parse_box_at(&raw, 0).unwrap();
        assert_eq!(consumed, 13);
        match &parsed {
            AnyBox::Unknown(u) => {
                assert_eq!(u.box_type, FourCC(*b"abcd"));
                assert_eq!(u.data, [1, 2, 3, 4, 5]);
            }
            other => panic!("unexpected box {:?}", other.fourcc()),
        }

        let mut out = BytesMut::new();
        parsed.write(&mut out).unwrap();
        assert_eq!(&out[..], &raw[..]);
    }

    #[test]
    fn uuid_box_roundtrips_byte_exactly() {
        let raw = {
            let mut v = vec![0, 0, 0, 27, b'u', b'u', b'i', b'd'];
            v.extend_from_slice(&[0x42; 16]);
            v.extend_from_slice(&[9, 8, 7]);
            v
        };

        let (parsed, _) = parse_box_at(&raw, 0).unwrap();
        match &parsed {
            AnyBox::Unknown(u) => assert_eq!(u.uuid, Some([0x42; 16])),
            other => panic!("unexpected box {:?}", other.fourcc()),
        }

        let mut out = BytesMut::new();
        parsed.write(&mut out).unwrap();
        assert_eq!(&out[..], &raw[..]);
    }

    #[test]
    fn child_overrunning_its_parent_is_a_size_mismatch() {
        // the child declares 32 bytes but only 16 exist
        let buf = [0, 0, 0, 32, b'f', b'r', b'e', b'e', 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            decode_children(&buf, 0),
            Err(Mp4BoxError::SizeMismatch { overshoot: 16, .. })
        ));
    }

    #[test]
    fn decode_box_reads_eof_mdat() {
        let mut raw: Vec<u8> = vec![0, 0, 0, 0, b'm', b'd', b'a', b't'];
        raw.extend_from_slice(&[1, 2, 3]);

        let mut cursor = std::io::Cursor::new(raw);
        let (parsed, consumed) = decode_box(&mut cursor, 0).unwrap().unwrap();
        assert_eq!(consumed, 11);
        match parsed {
            AnyBox::Mdat(mdat) => {
                assert_eq!(mdat.data, [1, 2, 3]);
                assert_eq!(mdat.payload_absolute_offset(), 8);
            }
            other => panic!("unexpected box {:?}", other.fourcc()),
        }
    }

    #[test]
    fn eof_sized_non_mdat_is_rejected() {
        let raw: Vec<u8> = vec![0, 0, 0, 0, b'f', b'r', b'e', b'e'];
        let mut cursor = std::io::Cursor::new(raw);
        assert!(matches!(
            decode_box(&mut cursor, 0),
            Err(Mp4BoxError::MalformedHeader(_))
        ));
    }
}
