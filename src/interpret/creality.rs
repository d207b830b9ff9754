//! Creality ASCII records (MIFARE Classic 1K, sector 1).
//!
//! Blocks 4-6 hold a whitespace-separated record:
//! `<vendor> <material> <batch> #RRGGBB [name] [diameter mm] [length m]`,
//! where the first three tokens are two hex digits each.

use super::color;
use crate::detect::{creality_regex, creality_region};
use crate::error::InterpretationError;
use crate::types::{DecryptedScanData, FilamentInfo, TagFormat};

pub const REQUIRED_BLOCKS: &[u8] = &[4, 5];

const MATERIAL_CODES: &[(&str, &str)] = &[
    ("01", "PLA"),
    ("02", "PETG"),
    ("03", "ABS"),
    ("04", "TPU"),
    ("05", "ASA"),
    ("06", "PLA-CF"),
    ("07", "PA"),
    ("08", "PC"),
];

/// Material name for a two-digit code.
pub fn material_for_code(code: &str) -> Option<&'static str> {
    MATERIAL_CODES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrealityInterpreter;

impl CrealityInterpreter {
    pub fn decode(&self, data: &DecryptedScanData) -> Result<FilamentInfo, InterpretationError> {
        if let Some(&missing) = REQUIRED_BLOCKS.iter().find(|&&b| data.block(b).is_none()) {
            return Err(InterpretationError::MissingBlock(missing));
        }

        let region = creality_region(&data.blocks);
        let caps = creality_regex()
            .captures(&region)
            .ok_or_else(|| InterpretationError::Malformed {
                field: "record",
                reason: "no vendor/material/batch/color tokens".to_string(),
            })?;
        let group = |i: usize| String::from_utf8_lossy(&caps[i]).to_ascii_uppercase();

        let vendor = group(1);
        let material_code = group(2);
        let batch = group(3);
        let color_hex = color::normalize_hex(&group(4)).ok_or(InterpretationError::Malformed {
            field: "color",
            reason: group(4),
        })?;

        let end = caps.get(0).map_or(region.len(), |m| m.end());
        let trailing = Trailing::parse(&region[end..]);

        let filament_type = material_for_code(&material_code)
            .map(str::to_string)
            .or_else(|| trailing.name.clone())
            .ok_or(InterpretationError::MissingField("material"))?;

        Ok(FilamentInfo {
            tag_uid: data.uid.to_hex(),
            format: Some(TagFormat::CrealityAscii),
            manufacturer: Some("Creality".to_string()),
            filament_type,
            detailed_filament_type: trailing.name,
            color_name: color::name_for(&color_hex),
            color_hex,
            filament_diameter: trailing.diameter,
            filament_length: trailing.length,
            material_id: Some(material_code),
            vendor_code: Some(vendor),
            batch_code: Some(batch),
            ..FilamentInfo::default()
        })
    }
}

/// Optional tokens after the color.
#[derive(Debug, Default)]
struct Trailing {
    name: Option<String>,
    diameter: Option<f32>,
    length: Option<u16>,
}

impl Trailing {
    fn parse(bytes: &[u8]) -> Self {
        let text: String = bytes
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { ' ' })
            .collect();

        let mut out = Self::default();
        for token in text.split_whitespace() {
            if token.bytes().all(|b| b.is_ascii_digit()) {
                match token.parse::<u16>() {
                    Ok(length) => {
                        out.length.get_or_insert(length);
                    }
                    Err(_) => tracing::debug!(token, "length token out of range"),
                }
                continue;
            }
            if token.contains('.') {
                if let Ok(d) = token.parse::<f32>() {
                    if d.is_finite() && d > 0.0 {
                        out.diameter.get_or_insert(d);
                    }
                    continue;
                }
            }
            out.name.get_or_insert_with(|| token.to_string());
        }
        out
    }
}
