use bytes::Bytes;

/// Per-sample metadata, as it ends up in a track run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub flags: u32,
    pub duration: u32,
    pub size: u32,
    pub composition_time_offset: i32,
}

/// A sample together with its media data and absolute decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullSample {
    pub sample: Sample,
    pub decode_time: u64,
    pub data: Bytes,
}

impl FullSample {
    /// Presentation time is decode time shifted by the composition offset.
    pub fn presentation_time(&self) -> i64 {
        self.decode_time as i64 + self.sample.composition_time_offset as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presentation_time_applies_signed_offset() {
        let s = FullSample {
            sample: Sample {
                flags: 0,
                duration: 10,
                size: 0,
                composition_time_offset: -3,
            },
            decode_time: 100,
            data: Bytes::new(),
        };

        assert_eq!(s.presentation_time(), 97);
    }
}
