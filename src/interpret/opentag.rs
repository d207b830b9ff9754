//! OpenTag v1 payloads on NDEF-capable tags.
//!
//! Offsets are relative to the `"OT"` signature at `s` (0 or 0x10):
//!
//! | Offset | Len | Field |
//! |---|---|---|
//! | s+2 | 16 | manufacturer |
//! | s+18 | 16 | material |
//! | s+34 | 32 | color name |
//! | s+66 | 4 | RGBA |
//! | s+70 | 2 | diameter, µm |
//! | s+72 | 2 | spool weight, g |
//! | s+74 | 2 | print temperature, °C |
//! | s+76 | 2 | bed temperature, °C |
//! | s+78 | 2 | density, mg/cm³ |
//! | s+80 | 1+n | production date, length-prefixed |
//!
//! Strings are null-padded. Everything from s+70 on is optional.

use super::{color, le_u16};
use crate::detect::{opentag_offset, padded_str};
use crate::error::InterpretationError;
use crate::types::{DecryptedScanData, FilamentInfo, TagFormat};

pub const REQUIRED_BLOCKS: &[u8] = &[0, 1, 2, 3, 4];

const MANUFACTURER: (usize, usize) = (2, 16);
const MATERIAL: (usize, usize) = (18, 16);
const COLOR_NAME: (usize, usize) = (34, 32);
const RGBA: usize = 66;
const DIAMETER: usize = 70;
const WEIGHT: usize = 72;
const PRINT_TEMP: usize = 74;
const BED_TEMP: usize = 76;
const DENSITY: usize = 78;
const PRODUCTION_DATE: usize = 80;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpenTagInterpreter;

impl OpenTagInterpreter {
    pub fn decode(&self, data: &DecryptedScanData) -> Result<FilamentInfo, InterpretationError> {
        self.decode_payload(&data.uid.to_hex(), &data.concatenated())
    }

    /// Decode a raw payload directly, e.g. a cached NDEF message.
    pub fn decode_payload(
        &self,
        tag_uid: &str,
        payload: &[u8],
    ) -> Result<FilamentInfo, InterpretationError> {
        let s = opentag_offset(payload).ok_or(InterpretationError::MissingField("signature"))?;
        if payload.len() < s + DIAMETER {
            return Err(InterpretationError::Malformed {
                field: "payload",
                reason: format!("{} bytes, need {}", payload.len(), s + DIAMETER),
            });
        }
        let body = &payload[s..];
        let text = |(offset, len): (usize, usize)| padded_str(&body[offset..offset + len]);
        let optional_u16 = |offset: usize| Some(le_u16(body, offset)).filter(|&v| v > 0);

        let filament_type = text(MATERIAL).ok_or(InterpretationError::MissingField("material"))?;
        let [r, g, b, a] = [body[RGBA], body[RGBA + 1], body[RGBA + 2], body[RGBA + 3]];
        let color_hex = color::rgb_hex(r, g, b);
        let color_name = text(COLOR_NAME).unwrap_or_else(|| color::name_for(&color_hex));

        Ok(FilamentInfo {
            tag_uid: tag_uid.to_string(),
            format: Some(TagFormat::OpentagV1),
            manufacturer: text(MANUFACTURER),
            filament_type,
            color_hex,
            color_alpha: Some(a),
            color_name,
            filament_diameter: optional_u16(DIAMETER).map(|um| f32::from(um) / 1000.0),
            spool_weight: optional_u16(WEIGHT),
            max_temperature: optional_u16(PRINT_TEMP),
            bed_temperature: optional_u16(BED_TEMP),
            density: optional_u16(DENSITY).map(|mg| f32::from(mg) / 1000.0),
            production_date: production_date(body),
            ..FilamentInfo::default()
        })
    }
}

/// Whether `payload` reaches the end of the color fields. Payloads without
/// a signature are left for the decoder to reject.
pub fn payload_complete(payload: &[u8]) -> bool {
    opentag_offset(payload).map_or(true, |s| payload.len() >= s + DIAMETER)
}

fn production_date(body: &[u8]) -> Option<String> {
    let len = usize::from(*body.get(PRODUCTION_DATE)?);
    let start = PRODUCTION_DATE + 1;
    body.get(start..start + len).and_then(padded_str)
}
