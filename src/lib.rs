//! Fragmented-MP4 (ISOBMFF) box codec.
//!
//! Decodes and re-encodes the box tree of an MP4 fragment (`[prft] moof
//! mdat`) byte-exactly, and resolves the fragment's sample table into a flat
//! sequence of timed samples.

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
pub use four_cc::FourCC;

mod boxes;
mod fragment;
mod sample;

pub use boxes::*;
pub use fragment::Fragment;
pub use sample::{FullSample, Sample};

fn get_total_box_size<B: Mp4Box + ?Sized>(boks: &B) -> u64 {
    let mut size = boks.content_size() + 8;

    if boks.get_full_box_header().is_some() {
        size += FullBoxHeader::SIZE;
    }

    // The 64-bit header form carries an extra largesize word.
    if size > u32::MAX as u64 {
        size += 8;
    }

    size
}

fn write_box_header(header: &mut [u8], fourcc: FourCC, size: u64) -> usize {
    if size > u32::MAX as u64 {
        BigEndian::write_u32(&mut header[..], 1);
        header[4..8].copy_from_slice(&fourcc.0);
        BigEndian::write_u64(&mut header[8..], size);

        16
    } else {
        BigEndian::write_u32(&mut header[..], size as u32);
        header[4..8].copy_from_slice(&fourcc.0);

        8
    }
}

fn write_full_box_header(header: &mut [u8], box_header: FullBoxHeader) -> usize {
    header[0] = box_header.version;
    BigEndian::write_u24(&mut header[1..], box_header.flags);

    4
}

#[derive(Copy, Clone)]
pub struct FullBoxHeader {
    version: u8,
    flags: u32,
}

impl FullBoxHeader {
    pub const SIZE: u64 = 4;

    pub fn new(version: u8, flags: u32) -> Self {
        FullBoxHeader { version, flags }
    }

    pub(crate) fn read(payload: &[u8]) -> Self {
        FullBoxHeader {
            version: payload[0],
            flags: BigEndian::read_u24(&payload[1..]),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Mp4BoxError {
    #[error("Failed to read or write box: {0}")]
    IoError(#[from] io::Error),
    #[error("Malformed box header: {0}")]
    MalformedHeader(String),
    #[error("Malformed '{fourcc}' box: {reason}")]
    MalformedBox { fourcc: FourCC, reason: String },
    #[error("Child '{fourcc}' box overruns its parent by {overshoot} bytes")]
    SizeMismatch { fourcc: FourCC, overshoot: u64 },
    #[error("Unsupported version {version} for '{fourcc}' box")]
    UnsupportedVersion { fourcc: FourCC, version: u8 },
    #[error("Missing mandatory '{fourcc}' box in {parent}")]
    MissingBox { fourcc: FourCC, parent: &'static str },
    #[error("Sample data at offset {offset} is outside the mdat payload of {payload_len} bytes")]
    OffsetOutOfRange { offset: i64, payload_len: u64 },
    #[error("No track fragment with track_id={0}")]
    UnknownTrack(u32),
}

/// A decoded box preamble: declared total size, four-byte type, and the
/// extended type carried by `uuid` boxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    pub size: u64,
    pub fourcc: FourCC,
    pub uuid: Option<[u8; 16]>,
    pub header_size: u64,
}

impl BoxHeader {
    /// Read a header from `reader`. Returns `Ok(None)` on a clean end of
    /// stream before the first header byte.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Option<BoxHeader>, Mp4BoxError> {
        let mut first = [0u8; 8];
        if !read_exact_or_eof(reader, &mut first)? {
            return Ok(None);
        }

        let size32 = BigEndian::read_u32(&first);
        let fourcc = FourCC([first[4], first[5], first[6], first[7]]);

        let mut header_size = 8u64;
        let size = match size32 {
            0 => 0,
            1 => {
                let mut large = [0u8; 8];
                reader.read_exact(&mut large).map_err(truncated_header)?;
                header_size += 8;
                BigEndian::read_u64(&large)
            }
            _ => size32 as u64,
        };

        let uuid = if &fourcc.0 == b"uuid" {
            let mut ext = [0u8; 16];
            reader.read_exact(&mut ext).map_err(truncated_header)?;
            header_size += 16;
            Some(ext)
        } else {
            None
        };

        if size != 0 && size < header_size {
            return Err(Mp4BoxError::MalformedHeader(format!(
                "'{fourcc}' box declares size {size}, less than its {header_size}-byte header"
            )));
        }

        Ok(Some(BoxHeader {
            size,
            fourcc,
            uuid,
            header_size,
        }))
    }

    /// Parse a header at the start of `buf`. Child boxes are always fully in
    /// memory, so `size == 0` (extends to end of file) is rejected here.
    pub fn parse(buf: &[u8]) -> Result<BoxHeader, Mp4BoxError> {
        if buf.len() < 8 {
            return Err(Mp4BoxError::MalformedHeader(format!(
                "{} bytes left, too few for a box header",
                buf.len()
            )));
        }

        let size32 = BigEndian::read_u32(buf);
        let fourcc = FourCC([buf[4], buf[5], buf[6], buf[7]]);

        let mut header_size = 8u64;
        let size = match size32 {
            0 => {
                return Err(Mp4BoxError::MalformedHeader(format!(
                    "'{fourcc}' box with size 0; only a top-level mdat may extend to end of stream"
                )))
            }
            1 => {
                if buf.len() < 16 {
                    return Err(Mp4BoxError::MalformedHeader(format!(
                        "'{fourcc}' box header truncated in largesize"
                    )));
                }
                header_size += 8;
                BigEndian::read_u64(&buf[8..])
            }
            _ => size32 as u64,
        };

        let uuid = if &fourcc.0 == b"uuid" {
            let start = header_size as usize;
            if buf.len() < start + 16 {
                return Err(Mp4BoxError::MalformedHeader(format!(
                    "'{fourcc}' box header truncated in extended type"
                )));
            }
            let mut ext = [0u8; 16];
            ext.copy_from_slice(&buf[start..start + 16]);
            header_size += 16;
            Some(ext)
        } else {
            None
        };

        if size < header_size {
            return Err(Mp4BoxError::MalformedHeader(format!(
                "'{fourcc}' box declares size {size}, less than its {header_size}-byte header"
            )));
        }

        Ok(BoxHeader {
            size,
            fourcc,
            uuid,
            header_size,
        })
    }
}

fn truncated_header(e: io::Error) -> Mp4BoxError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Mp4BoxError::MalformedHeader("box header truncated".into())
    } else {
        Mp4BoxError::IoError(e)
    }
}

fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, Mp4BoxError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(Mp4BoxError::MalformedHeader(format!(
                "box header truncated after {filled} bytes"
            )));
        }
        filled += n;
    }
    Ok(true)
}

/// A trait interface for a MP4 box.
pub trait Mp4Box {
    fn fourcc(&self) -> FourCC;

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        None
    }

    /// The size of the contents of the box.
    fn content_size(&self) -> u64;

    fn size(&self) -> u64 {
        get_total_box_size(self)
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError>;

    fn write(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut header = [0u8; 20];

        let mut size = write_box_header(&mut header, self.fourcc(), self.size());
        if let Some(box_header) = self.get_full_box_header() {
            size += write_full_box_header(&mut header[size..], box_header);
        }

        writer.put_slice(&header[..size]);

        self.write_box_contents(writer)?;

        Ok(())
    }

    fn dump<W: io::Write>(&self, w: &mut W, indent: usize) -> io::Result<()>
    where
        Self: Sized,
    {
        writeln!(w, "{:indent$}[{}] size={}", "", self.fourcc(), self.size())
    }
}

pub(crate) fn check_payload(fourcc: FourCC, payload: &[u8], expected: u64) -> Result<(), Mp4BoxError> {
    if payload.len() as u64 != expected {
        return Err(Mp4BoxError::MalformedBox {
            fourcc,
            reason: format!("expected {expected} payload bytes, got {}", payload.len()),
        });
    }

    Ok(())
}

pub(crate) fn check_payload_at_least(
    fourcc: FourCC,
    payload: &[u8],
    needed: u64,
) -> Result<(), Mp4BoxError> {
    if (payload.len() as u64) < needed {
        return Err(Mp4BoxError::MalformedBox {
            fourcc,
            reason: format!("expected at least {needed} payload bytes, got {}", payload.len()),
        });
    }

    Ok(())
}
