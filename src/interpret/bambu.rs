//! Bambu Lab proprietary block layout (MIFARE Classic 1K).
//!
//! | Block | Content |
//! |---|---|
//! | 1 | material variant id (0-7), material id (8-15) |
//! | 2 | filament type |
//! | 4 | detailed filament type |
//! | 5 | RGBA (0-3), spool weight u16 (4-5), diameter f32 (8-11) |
//! | 6 | drying temp, drying time, bed temp type, bed temp, max/min nozzle (u16 each) |
//! | 8 | nozzle diameter f32 (12-15) |
//! | 9 | tray identifier |
//! | 10 | spool width u16, hundredths of mm (4-5) |
//! | 12 | production date `YYYY_MM_DD_HH_MM` |
//! | 14 | filament length u16, metres (4-5) |
//! | 16 | color format (0-1), color count (2-3), second color ABGR (4-7) |
//!
//! All integers and floats are little-endian.

use super::{color, le_f32, le_u16};
use crate::detect::padded_str;
use crate::error::InterpretationError;
use crate::types::{Block, DecryptedScanData, FilamentInfo, TagFormat};

pub const MATERIAL_ID_BLOCK: u8 = 1;
pub const FILAMENT_TYPE_BLOCK: u8 = 2;
pub const DETAILED_TYPE_BLOCK: u8 = 4;
pub const COLOR_BLOCK: u8 = 5;
pub const TEMPERATURE_BLOCK: u8 = 6;
pub const NOZZLE_BLOCK: u8 = 8;
pub const TRAY_UID_BLOCK: u8 = 9;
pub const SPOOL_WIDTH_BLOCK: u8 = 10;
pub const PRODUCTION_DATE_BLOCK: u8 = 12;
pub const LENGTH_BLOCK: u8 = 14;
pub const EXTRA_COLOR_BLOCK: u8 = 16;

pub const REQUIRED_BLOCKS: &[u8] = &[
    FILAMENT_TYPE_BLOCK,
    DETAILED_TYPE_BLOCK,
    COLOR_BLOCK,
    TEMPERATURE_BLOCK,
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BambuInterpreter;

impl BambuInterpreter {
    pub fn decode(&self, data: &DecryptedScanData) -> Result<FilamentInfo, InterpretationError> {
        let block = |index: u8| {
            data.block(index)
                .ok_or(InterpretationError::MissingBlock(index))
        };

        let filament_type = padded_str(block(FILAMENT_TYPE_BLOCK)?)
            .ok_or(InterpretationError::MissingField("filament type"))?;
        let detailed_filament_type = padded_str(block(DETAILED_TYPE_BLOCK)?);

        let color_block = block(COLOR_BLOCK)?;
        let [r, g, b, a] = [color_block[0], color_block[1], color_block[2], color_block[3]];
        let color_hex = color::rgb_hex(r, g, b);
        let spool_weight = le_u16(color_block, 4);
        let diameter = le_f32(color_block, 8);
        if !diameter.is_finite() || diameter < 0.0 {
            return Err(InterpretationError::Malformed {
                field: "filament diameter",
                reason: format!("{diameter}"),
            });
        }

        let temps = block(TEMPERATURE_BLOCK)?;

        let mut info = FilamentInfo {
            tag_uid: data.uid.to_hex(),
            format: Some(TagFormat::BambuProprietary),
            manufacturer: Some("Bambu Lab".to_string()),
            filament_type,
            detailed_filament_type,
            color_name: color::name_for(&color_hex),
            color_hex,
            color_alpha: Some(a),
            spool_weight: Some(spool_weight),
            filament_diameter: Some(diameter),
            drying_temperature: Some(le_u16(temps, 0)),
            drying_time: Some(le_u16(temps, 2)),
            bed_temperature_type: Some(le_u16(temps, 4)),
            bed_temperature: Some(le_u16(temps, 6)),
            max_temperature: Some(le_u16(temps, 8)),
            min_temperature: Some(le_u16(temps, 10)),
            ..FilamentInfo::default()
        };

        if let Some(ids) = data.block(MATERIAL_ID_BLOCK) {
            info.material_variant_id = padded_str(&ids[..8]);
            info.material_id = padded_str(&ids[8..]);
        }
        if let Some(nozzle) = data.block(NOZZLE_BLOCK) {
            let d = le_f32(nozzle, 12);
            info.nozzle_diameter = (d.is_finite() && d > 0.0).then_some(d);
        }
        info.tray_uid = data.block(TRAY_UID_BLOCK).and_then(tray_identifier);
        if let Some(width) = data.block(SPOOL_WIDTH_BLOCK) {
            let w = le_u16(width, 4);
            info.spool_width = (w > 0).then(|| f32::from(w) / 100.0);
        }
        info.production_date = data.block(PRODUCTION_DATE_BLOCK).and_then(|b| padded_str(b));
        if let Some(length) = data.block(LENGTH_BLOCK) {
            let m = le_u16(length, 4);
            info.filament_length = (m > 0).then_some(m);
        }
        if let Some(extra) = data.block(EXTRA_COLOR_BLOCK) {
            let count = le_u16(extra, 2);
            if count > 0 {
                info.color_count = Some(count);
            }
            if count > 1 {
                // Stored ABGR.
                info.secondary_color_hex = Some(color::rgb_hex(extra[7], extra[6], extra[5]));
            }
        }

        Ok(info)
    }
}

/// Tray identifier as text. Falls back to uppercase hex only when the block
/// is not printable UTF-8.
pub fn tray_identifier(block: &Block) -> Option<String> {
    let end = block.iter().rposition(|&b| b != 0).map(|i| i + 1)?;
    let bytes = &block[..end];
    match std::str::from_utf8(bytes) {
        Ok(s) if s.chars().all(|c| !c.is_control()) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        _ => Some(hex::encode_upper(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawBlockMap, ScanResult, TagUid};

    fn padded(text: &[u8]) -> Block {
        let mut b = [0u8; 16];
        b[..text.len()].copy_from_slice(text);
        b
    }

    fn sample_blocks() -> RawBlockMap {
        let mut blocks = RawBlockMap::new();
        blocks.insert(1, padded(b"A00-R0\0\0GFA00"));
        blocks.insert(2, padded(b"PLA"));
        blocks.insert(4, padded(b"PLA Basic"));

        let mut color = [0u8; 16];
        color[..4].copy_from_slice(&[0xFF, 0x00, 0x00, 0xFF]);
        color[4..6].copy_from_slice(&1000u16.to_le_bytes());
        color[8..12].copy_from_slice(&1.75f32.to_le_bytes());
        blocks.insert(5, color);

        let mut temps = [0u8; 16];
        for (i, v) in [40u16, 8, 1, 60, 210, 190].iter().enumerate() {
            temps[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
        }
        blocks.insert(6, temps);
        blocks.insert(9, padded(b"TRAY001"));
        blocks
    }

    fn scan(uid: &[u8], blocks: RawBlockMap) -> DecryptedScanData {
        let mut data = DecryptedScanData::empty(TagUid::new(uid.to_vec()), ScanResult::Success);
        data.blocks = blocks;
        data
    }

    #[test]
    fn decodes_core_fields() {
        let info = BambuInterpreter
            .decode(&scan(&[1, 2, 3, 4], sample_blocks()))
            .unwrap();
        assert_eq!(info.filament_type, "PLA");
        assert_eq!(info.detailed_filament_type.as_deref(), Some("PLA Basic"));
        assert_eq!(info.color_hex, "#FF0000");
        assert_eq!(info.color_name, "Red");
        assert_eq!(info.spool_weight, Some(1000));
        assert_eq!(info.filament_diameter, Some(1.75));
        assert_eq!(info.drying_temperature, Some(40));
        assert_eq!(info.drying_time, Some(8));
        assert_eq!(info.bed_temperature, Some(60));
        assert_eq!(info.max_temperature, Some(210));
        assert_eq!(info.min_temperature, Some(190));
        assert_eq!(info.material_variant_id.as_deref(), Some("A00-R0"));
        assert_eq!(info.material_id.as_deref(), Some("GFA00"));
    }

    #[test]
    fn tray_identifier_is_text_not_hex() {
        let a = BambuInterpreter
            .decode(&scan(&[1, 2, 3, 4], sample_blocks()))
            .unwrap();
        let b = BambuInterpreter
            .decode(&scan(&[9, 8, 7, 6], sample_blocks()))
            .unwrap();
        assert_eq!(a.tray_uid.as_deref(), Some("TRAY001"));
        assert_eq!(a.tray_uid, b.tray_uid);
        assert_ne!(a.tag_uid, b.tag_uid);
    }

    #[test]
    fn binary_tray_identifier_falls_back_to_hex() {
        let mut block = [0u8; 16];
        block[..4].copy_from_slice(&[0x8F, 0x01, 0xC2, 0x7E]);
        assert_eq!(tray_identifier(&block).as_deref(), Some("8F01C27E"));
        assert_eq!(tray_identifier(&[0u8; 16]), None);
    }

    #[test]
    fn optional_blocks_decode_when_present() {
        let mut blocks = sample_blocks();
        let mut nozzle = [0u8; 16];
        nozzle[12..16].copy_from_slice(&0.4f32.to_le_bytes());
        blocks.insert(8, nozzle);
        let mut width = [0u8; 16];
        width[4..6].copy_from_slice(&6625u16.to_le_bytes());
        blocks.insert(10, width);
        blocks.insert(12, padded(b"2024_03_15_09_52"));
        let mut length = [0u8; 16];
        length[4..6].copy_from_slice(&330u16.to_le_bytes());
        blocks.insert(14, length);
        let mut extra = [0u8; 16];
        extra[2..4].copy_from_slice(&2u16.to_le_bytes());
        extra[4..8].copy_from_slice(&[0xFF, 0xFF, 0x00, 0x00]);
        blocks.insert(16, extra);

        let info = BambuInterpreter.decode(&scan(&[1, 2, 3, 4], blocks)).unwrap();
        assert_eq!(info.nozzle_diameter, Some(0.4));
        assert_eq!(info.spool_width, Some(66.25));
        assert_eq!(info.production_date.as_deref(), Some("2024_03_15_09_52"));
        assert_eq!(info.filament_length, Some(330));
        assert_eq!(info.color_count, Some(2));
        assert_eq!(info.secondary_color_hex.as_deref(), Some("#0000FF"));
    }

    #[test]
    fn empty_material_block_is_missing_field() {
        let mut blocks = sample_blocks();
        blocks.insert(2, [0u8; 16]);
        assert_eq!(
            BambuInterpreter.decode(&scan(&[1, 2, 3, 4], blocks)),
            Err(InterpretationError::MissingField("filament type"))
        );
    }

    #[test]
    fn missing_temperature_block_is_reported() {
        let mut blocks = sample_blocks();
        blocks.remove(&6);
        assert_eq!(
            BambuInterpreter.decode(&scan(&[1, 2, 3, 4], blocks)),
            Err(InterpretationError::MissingBlock(6))
        );
    }
}
