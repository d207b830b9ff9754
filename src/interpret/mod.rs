//! Format interpreters: raw blocks to [`FilamentInfo`].
//!
//! One implementation per [`TagFormat`], picked by an explicit match.
//! Interpreters never panic on short or garbled input; they return an
//! [`InterpretationError`] that [`Interpreter::interpret`] turns into `None`.

pub mod bambu;
pub mod color;
pub mod creality;
pub mod generic;
pub mod opentag;

use crate::error::InterpretationError;
use crate::types::{DecryptedScanData, FilamentInfo, TagFormat};

pub use bambu::BambuInterpreter;
pub use creality::CrealityInterpreter;
pub use generic::GenericInterpreter;
pub use opentag::OpenTagInterpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Bambu(BambuInterpreter),
    Creality(CrealityInterpreter),
    OpenTag(OpenTagInterpreter),
    Generic(GenericInterpreter),
}

impl Interpreter {
    pub fn for_format(format: TagFormat) -> Self {
        match format {
            TagFormat::BambuProprietary => Self::Bambu(BambuInterpreter),
            TagFormat::CrealityAscii => Self::Creality(CrealityInterpreter),
            TagFormat::OpentagV1 => Self::OpenTag(OpenTagInterpreter),
            TagFormat::Unknown => Self::Generic(GenericInterpreter),
        }
    }

    /// Decode, keeping the reason on failure.
    pub fn decode(&self, data: &DecryptedScanData) -> Result<FilamentInfo, InterpretationError> {
        match self {
            Self::Bambu(i) => i.decode(data),
            Self::Creality(i) => i.decode(data),
            Self::OpenTag(i) => i.decode(data),
            Self::Generic(i) => i.decode(data),
        }
    }

    /// Decode, or `None` when required fields are absent or malformed.
    pub fn interpret(&self, data: &DecryptedScanData) -> Option<FilamentInfo> {
        match self.decode(data) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!(uid = %data.uid, format = %data.format, error = %e, "interpretation failed");
                None
            }
        }
    }
}

/// Blocks a format cannot be decoded without.
pub fn required_blocks(format: TagFormat) -> &'static [u8] {
    match format {
        TagFormat::BambuProprietary => bambu::REQUIRED_BLOCKS,
        TagFormat::CrealityAscii => creality::REQUIRED_BLOCKS,
        TagFormat::OpentagV1 => opentag::REQUIRED_BLOCKS,
        TagFormat::Unknown => &[],
    }
}

/// Whether `data` holds everything its format's decoder needs.
pub fn has_required_data(data: &DecryptedScanData) -> bool {
    if !data.has_blocks(required_blocks(data.format)) {
        return false;
    }
    match data.format {
        TagFormat::OpentagV1 => opentag::payload_complete(&data.concatenated()),
        _ => true,
    }
}

/// Little-endian u16 at `offset`; 0 when out of range.
pub(crate) fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .unwrap_or(0)
}

/// Little-endian IEEE-754 f32 at `offset`; 0.0 when out of range.
pub(crate) fn le_f32(bytes: &[u8], offset: usize) -> f32 {
    bytes
        .get(offset..offset + 4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0.0)
}
