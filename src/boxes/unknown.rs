use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, Mp4Box, Mp4BoxError};

/// Carrier for box types outside the registry, including all `uuid` boxes.
/// Keeps the raw payload so re-encoding reproduces the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBox {
    pub box_type: FourCC,
    pub uuid: Option<[u8; 16]>,
    pub data: Vec<u8>,
}

impl UnknownBox {
    pub(crate) fn from_parts(header: &BoxHeader, payload: &[u8]) -> Self {
        UnknownBox {
            box_type: header.fourcc,
            uuid: header.uuid,
            data: payload.to_vec(),
        }
    }
}

impl Mp4Box for UnknownBox {
    fn fourcc(&self) -> FourCC {
        self.box_type
    }

    fn content_size(&self) -> u64 {
        let uuid_len = if self.uuid.is_some() { 16 } else { 0 };

        uuid_len + self.data.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        if let Some(uuid) = &self.uuid {
            writer.put_slice(uuid);
        }

        writer.put_slice(&self.data);

        Ok(())
    }

    fn dump<W: std::io::Write>(&self, w: &mut W, indent: usize) -> std::io::Result<()> {
        writeln!(
            w,
            "{:indent$}[{}] size={} (unknown)",
            "",
            self.box_type,
            self.size()
        )
    }
}
