//! WebVTT sample entry and cue boxes (ISO/IEC 14496-30).
//!
//! A wvtt sample is either a single `vtte` (no cue on screen) or a sequence
//! of `vttc`/`vtta` boxes; the sample entry itself carries the shared
//! configuration and source label.

use byteorder::{BigEndian, ByteOrder};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::Mp4BoxError;
use crate::{check_payload, BoxHeader, Mp4Box};

use super::{decode_children, AnyBox, BitRateBox};

// 14496-12 8.5.2.2 sample entry: 6 reserved bytes + data_reference_index.
const SAMPLE_ENTRY_HEADER_SIZE: u64 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct WebVttSampleEntryBox {
    pub data_reference_index: u16,
    pub children: Vec<AnyBox>,
}

impl WebVttSampleEntryBox {
    pub fn new() -> Self {
        WebVttSampleEntryBox {
            data_reference_index: 1,
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: AnyBox) {
        self.children.push(child);
    }

    pub fn config(&self) -> Option<&WebVttConfigurationBox> {
        self.children.iter().find_map(|c| match c {
            AnyBox::VttC(b) => Some(b),
            _ => None,
        })
    }

    pub fn source_label(&self) -> Option<&WebVttSourceLabelBox> {
        self.children.iter().find_map(|c| match c {
            AnyBox::Vlab(b) => Some(b),
            _ => None,
        })
    }

    pub fn bitrate(&self) -> Option<&BitRateBox> {
        self.children.iter().find_map(|c| match c {
            AnyBox::Btrt(b) => Some(b),
            _ => None,
        })
    }

    pub(crate) fn parse(
        header: &BoxHeader,
        start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        crate::check_payload_at_least(header.fourcc, payload, SAMPLE_ENTRY_HEADER_SIZE)?;

        let data_reference_index = BigEndian::read_u16(&payload[6..]);
        let children = decode_children(
            &payload[SAMPLE_ENTRY_HEADER_SIZE as usize..],
            start_pos + header.header_size + SAMPLE_ENTRY_HEADER_SIZE,
        )?;

        Ok(WebVttSampleEntryBox {
            data_reference_index,
            children,
        })
    }
}

impl Default for WebVttSampleEntryBox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4Box for WebVttSampleEntryBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"wvtt")
    }

    fn content_size(&self) -> u64 {
        let mut size = SAMPLE_ENTRY_HEADER_SIZE;

        for child in &self.children {
            size += child.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 8];
        BigEndian::write_u16(&mut contents[6..], self.data_reference_index);

        writer.put_slice(&contents);

        for child in &self.children {
            child.write(writer)?;
        }

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(w, "{:indent$}[wvtt] size={}", "", self.size())?;

        for child in &self.children {
            child.dump(w, indent + 2)?;
        }

        Ok(())
    }
}

/// The WebVTT file header block (everything before the first cue), verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebVttConfigurationBox {
    pub config: String,
}

impl WebVttConfigurationBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        Ok(WebVttConfigurationBox {
            config: utf8_payload(header.fourcc, payload)?,
        })
    }
}

impl Mp4Box for WebVttConfigurationBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"vttC")
    }

    fn content_size(&self) -> u64 {
        self.config.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(self.config.as_bytes());

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebVttSourceLabelBox {
    pub source_label: String,
}

impl WebVttSourceLabelBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        Ok(WebVttSourceLabelBox {
            source_label: utf8_payload(header.fourcc, payload)?,
        })
    }
}

impl Mp4Box for WebVttSourceLabelBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"vlab")
    }

    fn content_size(&self) -> u64 {
        self.source_label.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(self.source_label.as_bytes());

        Ok(())
    }
}

/// A sample with no cue on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VttEmptyCueBox;

impl VttEmptyCueBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        check_payload(header.fourcc, payload, 0)?;

        Ok(VttEmptyCueBox)
    }
}

impl Mp4Box for VttEmptyCueBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"vtte")
    }

    fn content_size(&self) -> u64 {
        0
    }

    fn write_box_contents(&self, _writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        Ok(())
    }
}

/// One cue, as a container of its id/time/settings/payload boxes.
#[derive(Debug, Clone, PartialEq)]
pub struct VttCueBox {
    pub children: Vec<AnyBox>,
}

impl VttCueBox {
    pub fn new() -> Self {
        VttCueBox {
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: AnyBox) {
        self.children.push(child);
    }

    pub fn source_id(&self) -> Option<&CueSourceIdBox> {
        self.children.iter().find_map(|c| match c {
            AnyBox::Vsid(b) => Some(b),
            _ => None,
        })
    }

    pub fn cue_id(&self) -> Option<&CueIdBox> {
        self.children.iter().find_map(|c| match c {
            AnyBox::Iden(b) => Some(b),
            _ => None,
        })
    }

    pub fn cue_time(&self) -> Option<&CueTimeBox> {
        self.children.iter().find_map(|c| match c {
            AnyBox::Ctim(b) => Some(b),
            _ => None,
        })
    }

    pub fn settings(&self) -> Option<&CueSettingsBox> {
        self.children.iter().find_map(|c| match c {
            AnyBox::Sttg(b) => Some(b),
            _ => None,
        })
    }

    pub fn payload(&self) -> Option<&CuePayloadBox> {
        self.children.iter().find_map(|c| match c {
            AnyBox::Payl(b) => Some(b),
            _ => None,
        })
    }

    pub(crate) fn parse(
        header: &BoxHeader,
        start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        let children = decode_children(payload, start_pos + header.header_size)?;

        Ok(VttCueBox { children })
    }
}

impl Default for VttCueBox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4Box for VttCueBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"vttc")
    }

    fn content_size(&self) -> u64 {
        self.children.iter().map(AnyBox::size).sum()
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        for child in &self.children {
            child.write(writer)?;
        }

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(w, "{:indent$}[vttc] size={}", "", self.size())?;

        for child in &self.children {
            child.dump(w, indent + 2)?;
        }

        Ok(())
    }
}

/// Source id for cues split across samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueSourceIdBox {
    pub source_id: u32,
}

impl CueSourceIdBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        check_payload(header.fourcc, payload, 4)?;

        Ok(CueSourceIdBox {
            source_id: BigEndian::read_u32(payload),
        })
    }
}

impl Mp4Box for CueSourceIdBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"vsid")
    }

    fn content_size(&self) -> u64 {
        4
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 4];
        BigEndian::write_u32(&mut contents, self.source_id);

        writer.put_slice(&contents);

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(
            w,
            "{:indent$}[vsid] size={} source_id={}",
            "",
            self.size(),
            self.source_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueIdBox {
    pub cue_id: String,
}

impl CueIdBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        Ok(CueIdBox {
            cue_id: utf8_payload(header.fourcc, payload)?,
        })
    }
}

impl Mp4Box for CueIdBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"iden")
    }

    fn content_size(&self) -> u64 {
        self.cue_id.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(self.cue_id.as_bytes());

        Ok(())
    }
}

/// Current time indication for cues that were split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueTimeBox {
    pub cue_current_time: String,
}

impl CueTimeBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        Ok(CueTimeBox {
            cue_current_time: utf8_payload(header.fourcc, payload)?,
        })
    }
}

impl Mp4Box for CueTimeBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"ctim")
    }

    fn content_size(&self) -> u64 {
        self.cue_current_time.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(self.cue_current_time.as_bytes());

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueSettingsBox {
    pub settings: String,
}

impl CueSettingsBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        Ok(CueSettingsBox {
            settings: utf8_payload(header.fourcc, payload)?,
        })
    }
}

impl Mp4Box for CueSettingsBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"sttg")
    }

    fn content_size(&self) -> u64 {
        self.settings.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(self.settings.as_bytes());

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuePayloadBox {
    pub cue_text: String,
}

impl CuePayloadBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        Ok(CuePayloadBox {
            cue_text: utf8_payload(header.fourcc, payload)?,
        })
    }
}

impl Mp4Box for CuePayloadBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"payl")
    }

    fn content_size(&self) -> u64 {
        self.cue_text.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(self.cue_text.as_bytes());

        Ok(())
    }
}

/// A WebVTT NOTE block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VttAdditionalTextBox {
    pub cue_additional_text: String,
}

impl VttAdditionalTextBox {
    pub(crate) fn parse(
        header: &BoxHeader,
        _start_pos: u64,
        payload: &[u8],
    ) -> Result<Self, Mp4BoxError> {
        Ok(VttAdditionalTextBox {
            cue_additional_text: utf8_payload(header.fourcc, payload)?,
        })
    }
}

impl Mp4Box for VttAdditionalTextBox {
    fn fourcc(&self) -> FourCC {
        FourCC(*b"vtta")
    }

    fn content_size(&self) -> u64 {
        self.cue_additional_text.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(self.cue_additional_text.as_bytes());

        Ok(())
    }
}

fn utf8_payload(fourcc: FourCC, payload: &[u8]) -> Result<String, Mp4BoxError> {
    String::from_utf8(payload.to_vec()).map_err(|_| Mp4BoxError::MalformedBox {
        fourcc,
        reason: "payload is not valid UTF-8".into(),
    })
}
