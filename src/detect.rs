//! Tag technology and data-format detection.
//!
//! Detection never fails: unreadable tags come back as `Unknown` with
//! confidence 0.0 and the cause in `reason`.

use std::sync::OnceLock;

use regex::bytes::Regex;

use crate::error::DetectionError;
use crate::hardware::{HardwareAdapter, TagDescriptor};
use crate::types::{
    RawBlockMap, TagDetectionResult, TagFormat, TagTechnology, BLOCK_SIZE, CLASSIC_1K_BLOCKS,
    SECTOR_COUNT,
};

/// `"OT"`
pub const OPENTAG_MAGIC: [u8; 2] = [0x4F, 0x54];

/// Alternate signature position (after one 16-byte header block).
pub const OPENTAG_SECONDARY_OFFSET: usize = 0x10;

/// Manufacturer field immediately following the signature.
pub const OPENTAG_MANUFACTURER_LEN: usize = 16;

/// Blocks carrying the Creality ASCII record (sector 1 data blocks).
pub const CREALITY_BLOCKS: [u8; 3] = [4, 5, 6];

const CREALITY_PATTERN: &str =
    r"(?-u)\b([0-9A-Fa-f]{2})\s+([0-9A-Fa-f]{2})\s+([0-9A-Fa-f]{2})\s+#([0-9A-Fa-f]{6})\b";

pub(crate) fn creality_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CREALITY_PATTERN).expect("valid Creality pattern"))
}

/// Concatenation of the Creality blocks present in `blocks`, in order.
pub(crate) fn creality_region(blocks: &RawBlockMap) -> Vec<u8> {
    CREALITY_BLOCKS
        .iter()
        .filter_map(|b| blocks.get(b))
        .flatten()
        .copied()
        .collect()
}

/// Offset of the OpenTag signature, if present at either allowed position.
pub(crate) fn opentag_offset(payload: &[u8]) -> Option<usize> {
    [0, OPENTAG_SECONDARY_OFFSET]
        .into_iter()
        .find(|&off| payload.get(off..off + OPENTAG_MAGIC.len()) == Some(&OPENTAG_MAGIC[..]))
}

/// Null-padded ASCII/UTF-8 field, trimmed. `None` if empty after trimming.
pub(crate) fn padded_str(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let s = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
    (!s.is_empty()).then_some(s)
}

/// Technology from structural properties alone.
pub fn classify_technology(descriptor: &TagDescriptor) -> TagTechnology {
    if descriptor.sector_count == Some(SECTOR_COUNT as u8)
        && descriptor.block_count == Some(CLASSIC_1K_BLOCKS as u16)
    {
        return TagTechnology::MifareClassic1k;
    }
    let ndef_capable = descriptor.technologies.iter().any(|t| {
        let t = t.to_ascii_lowercase();
        t.contains("ndef") || t.contains("ultralight") || t.contains("ntag")
    });
    if ndef_capable {
        TagTechnology::Ndef
    } else {
        TagTechnology::Unknown
    }
}

/// Classify a tag from its descriptor and, when available, raw bytes.
///
/// For sector cards `raw` is a block-aligned dump starting at block 0; for
/// NDEF tags it is the payload (falls back to `descriptor.payload`).
pub fn detect(descriptor: &TagDescriptor, raw: Option<&[u8]>) -> TagDetectionResult {
    match classify_technology(descriptor) {
        TagTechnology::MifareClassic1k => {
            let region = raw.and_then(|bytes| {
                let start = CREALITY_BLOCKS[0] as usize * BLOCK_SIZE;
                let end = (start + CREALITY_BLOCKS.len() * BLOCK_SIZE).min(bytes.len());
                bytes.get(start..end)
            });
            detect_sector_card(region)
        }
        TagTechnology::Ndef => {
            let payload = raw.or(descriptor.payload.as_deref()).unwrap_or(&[]);
            detect_ndef(payload)
        }
        TagTechnology::Unknown => TagDetectionResult {
            format: TagFormat::Unknown,
            technology: TagTechnology::Unknown,
            confidence: 0.1,
            reason: format!(
                "Unsupported tag technology {:?} ({:?} sectors, {:?} blocks)",
                descriptor.technologies, descriptor.sector_count, descriptor.block_count
            ),
            manufacturer: None,
        },
    }
}

/// Detect directly from a live adapter, absorbing any access failure.
pub fn detect_adapter(adapter: &dyn HardwareAdapter) -> TagDetectionResult {
    match adapter.descriptor().map_err(DetectionError::from) {
        Ok(descriptor) => detect(&descriptor, None),
        Err(e) => {
            tracing::warn!(error = %e, "tag detection failed");
            failed(&e)
        }
    }
}

/// Re-run sector-card detection once blocks have been read.
pub fn refine_with_blocks(initial: &TagDetectionResult, blocks: &RawBlockMap) -> TagDetectionResult {
    if initial.technology != TagTechnology::MifareClassic1k {
        return initial.clone();
    }
    let region = creality_region(blocks);
    if region.is_empty() {
        return initial.clone();
    }
    detect_sector_card(Some(&region))
}

fn detect_sector_card(region: Option<&[u8]>) -> TagDetectionResult {
    if let Some(caps) = region.and_then(|r| creality_regex().captures(r)) {
        let token = String::from_utf8_lossy(&caps[0]).to_string();
        return TagDetectionResult {
            format: TagFormat::CrealityAscii,
            technology: TagTechnology::MifareClassic1k,
            confidence: 0.9,
            reason: format!("ASCII signature \"{token}\" in blocks 4-6"),
            manufacturer: Some("Creality".to_string()),
        };
    }
    TagDetectionResult {
        format: TagFormat::BambuProprietary,
        technology: TagTechnology::MifareClassic1k,
        confidence: 0.8,
        reason: "1K sector layout (16 sectors, 64 blocks) without ASCII signature".to_string(),
        manufacturer: Some("Bambu Lab".to_string()),
    }
}

fn detect_ndef(payload: &[u8]) -> TagDetectionResult {
    match opentag_offset(payload) {
        Some(offset) => {
            let start = offset + OPENTAG_MAGIC.len();
            let end = (start + OPENTAG_MANUFACTURER_LEN).min(payload.len());
            let manufacturer = payload.get(start..end).and_then(padded_str);
            TagDetectionResult {
                format: TagFormat::OpentagV1,
                technology: TagTechnology::Ndef,
                confidence: 0.95,
                reason: format!("OpenTag signature at offset {offset:#04x}"),
                manufacturer,
            }
        }
        None => TagDetectionResult {
            format: TagFormat::Unknown,
            technology: TagTechnology::Ndef,
            confidence: 0.4,
            reason: format!("NDEF tag without known signature ({} payload bytes)", payload.len()),
            manufacturer: None,
        },
    }
}

pub(crate) fn failed(error: &DetectionError) -> TagDetectionResult {
    TagDetectionResult {
        format: TagFormat::Unknown,
        technology: TagTechnology::Unknown,
        confidence: 0.0,
        reason: format!("Detection failed: {error}"),
        manufacturer: None,
    }
}
