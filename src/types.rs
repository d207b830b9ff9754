//! Core data model shared by detection, key derivation, reading, and decoding.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of one card block in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Number of sectors on a 1K sector card.
pub const SECTOR_COUNT: usize = 16;

/// Blocks per sector on a 1K sector card (the last one is the trailer).
pub const BLOCKS_PER_SECTOR: usize = 4;

/// Total blocks on a 1K sector card.
pub const CLASSIC_1K_BLOCKS: usize = SECTOR_COUNT * BLOCKS_PER_SECTOR;

/// Length of a sector authentication key.
pub const SECTOR_KEY_LENGTH: usize = 6;

pub type Block = [u8; BLOCK_SIZE];

/// Block index → block contents. Only blocks from authenticated sectors appear.
pub type RawBlockMap = BTreeMap<u8, Block>;

// ============================================================================
// TagUid
// ============================================================================

/// Hardware-assigned chip identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TagUid(Vec<u8>);

impl TagUid {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s.trim()).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uppercase hex, used as the persistent cache key.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl fmt::Display for TagUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<TagUid> for String {
    fn from(uid: TagUid) -> Self {
        uid.to_hex()
    }
}

impl TryFrom<String> for TagUid {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TagUid::from_hex(&value)
    }
}

// ============================================================================
// Keys
// ============================================================================

/// A six-byte sector authentication key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Zeroize)]
pub struct SectorKey(pub [u8; SECTOR_KEY_LENGTH]);

impl SectorKey {
    pub fn as_bytes(&self) -> &[u8; SECTOR_KEY_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; SECTOR_KEY_LENGTH] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Debug for SectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SectorKey({})", self.to_hex())
    }
}

impl fmt::Display for SectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// One derived key per sector of a 1K card. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeySet {
    keys: [SectorKey; SECTOR_COUNT],
}

impl DerivedKeySet {
    pub fn new(keys: [SectorKey; SECTOR_COUNT]) -> Self {
        Self { keys }
    }

    /// Key for `sector`, or `None` if the index is out of range.
    pub fn key(&self, sector: usize) -> Option<&SectorKey> {
        self.keys.get(sector)
    }

    pub fn keys(&self) -> &[SectorKey; SECTOR_COUNT] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn to_hex_vec(&self) -> Vec<String> {
        self.keys.iter().map(SectorKey::to_hex).collect()
    }

    /// Parse 16 hex-encoded keys. Returns `None` unless every entry is a valid 6-byte key.
    pub fn from_hex_slice(hex_keys: &[String]) -> Option<Self> {
        if hex_keys.len() != SECTOR_COUNT {
            return None;
        }
        let mut keys = [SectorKey([0u8; SECTOR_KEY_LENGTH]); SECTOR_COUNT];
        for (slot, s) in keys.iter_mut().zip(hex_keys) {
            *slot = SectorKey::from_hex(s)?;
        }
        Some(Self { keys })
    }
}

/// Which of the two per-sector keys authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyVariant {
    A,
    B,
}

impl fmt::Display for KeyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyVariant::A => f.write_str("A"),
            KeyVariant::B => f.write_str("B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorAuthResult {
    pub sector: u8,
    pub success: bool,
    /// Set only when `success` is true.
    pub key_variant: Option<KeyVariant>,
}

// ============================================================================
// Detection
// ============================================================================

/// Hardware technology of the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagTechnology {
    /// 16 sectors × 4 blocks, 64 blocks total.
    #[serde(rename = "MIFARE_CLASSIC_1K")]
    MifareClassic1k,
    /// NDEF-capable tag (NTAG / Ultralight family).
    Ndef,
    Unknown,
}

impl fmt::Display for TagTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TagTechnology::MifareClassic1k => "MIFARE_CLASSIC_1K",
            TagTechnology::Ndef => "NDEF",
            TagTechnology::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Proprietary data layout stored on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagFormat {
    BambuProprietary,
    CrealityAscii,
    OpentagV1,
    Unknown,
}

impl fmt::Display for TagFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TagFormat::BambuProprietary => "BAMBU_PROPRIETARY",
            TagFormat::CrealityAscii => "CREALITY_ASCII",
            TagFormat::OpentagV1 => "OPENTAG_V1",
            TagFormat::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDetectionResult {
    pub format: TagFormat,
    pub technology: TagTechnology,
    /// 0.0 ..= 1.0
    pub confidence: f32,
    pub reason: String,
    pub manufacturer: Option<String>,
}

// ============================================================================
// Scan results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanResult {
    Success,
    NoNfcTag,
    InsufficientData,
    AuthenticationFailed,
    ParsingFailed,
    UnknownError,
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanResult::Success => "SUCCESS",
            ScanResult::NoNfcTag => "NO_NFC_TAG",
            ScanResult::InsufficientData => "INSUFFICIENT_DATA",
            ScanResult::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ScanResult::ParsingFailed => "PARSING_FAILED",
            ScanResult::UnknownError => "UNKNOWN_ERROR",
        };
        f.write_str(s)
    }
}

/// Progress stages of a scan. `Error` is reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStage {
    TagDetected,
    Connecting,
    KeyDerivation,
    Authenticating,
    ReadingBlocks,
    Parsing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTiming {
    pub key_derivation: Duration,
    pub authentication: Duration,
    pub reading: Duration,
    pub total: Duration,
}

/// Raw capture of one physical scan attempt, before interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedScanData {
    pub scan_id: String,
    pub uid: TagUid,
    pub technology: TagTechnology,
    /// Block bytes concatenated in ascending block order.
    pub raw_data: Vec<u8>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Authenticated read output consumed by the format interpreters.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedScanData {
    pub uid: TagUid,
    pub technology: TagTechnology,
    pub format: TagFormat,
    pub blocks: RawBlockMap,
    pub authenticated_sectors: Vec<u8>,
    pub failed_sectors: Vec<u8>,
    pub sector_key_types: BTreeMap<u8, KeyVariant>,
    pub derived_keys: Option<DerivedKeySet>,
    pub errors: Vec<String>,
    /// The session dropped before every sector/block was attempted.
    pub aborted: bool,
    pub result: ScanResult,
    pub timing: ScanTiming,
    pub timestamp: DateTime<Utc>,
}

impl DecryptedScanData {
    /// Empty record for a scan that produced no data at all.
    pub fn empty(uid: TagUid, result: ScanResult) -> Self {
        Self {
            uid,
            technology: TagTechnology::Unknown,
            format: TagFormat::Unknown,
            blocks: RawBlockMap::new(),
            authenticated_sectors: Vec::new(),
            failed_sectors: Vec::new(),
            sector_key_types: BTreeMap::new(),
            derived_keys: None,
            errors: Vec::new(),
            aborted: false,
            result,
            timing: ScanTiming::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn block(&self, index: u8) -> Option<&Block> {
        self.blocks.get(&index)
    }

    pub fn has_blocks(&self, required: &[u8]) -> bool {
        required.iter().all(|b| self.blocks.contains_key(b))
    }

    /// Block bytes concatenated in ascending block order.
    pub fn concatenated(&self) -> Vec<u8> {
        self.blocks.values().flatten().copied().collect()
    }

    /// Consume and return a copy with a different classification and extra errors.
    pub fn reclassified(mut self, result: ScanResult, extra_errors: Vec<String>) -> Self {
        self.result = result;
        self.errors.extend(extra_errors);
        self
    }

    pub fn with_format(mut self, format: TagFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_timing(mut self, timing: ScanTiming) -> Self {
        self.timing = timing;
        self
    }
}

// ============================================================================
// FilamentInfo
// ============================================================================

/// Decoded filament attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilamentInfo {
    pub tag_uid: String,
    /// Identifier shared by every tag on the same physical spool.
    pub tray_uid: Option<String>,
    pub format: Option<TagFormat>,
    pub manufacturer: Option<String>,
    pub filament_type: String,
    pub detailed_filament_type: Option<String>,
    /// `#RRGGBB`, uppercase.
    pub color_hex: String,
    pub color_alpha: Option<u8>,
    pub color_name: String,
    pub color_count: Option<u16>,
    pub secondary_color_hex: Option<String>,
    /// Grams.
    pub spool_weight: Option<u16>,
    /// Millimetres.
    pub filament_diameter: Option<f32>,
    /// Metres.
    pub filament_length: Option<u16>,
    /// Millimetres.
    pub spool_width: Option<f32>,
    pub nozzle_diameter: Option<f32>,
    pub drying_temperature: Option<u16>,
    /// Hours.
    pub drying_time: Option<u16>,
    pub bed_temperature_type: Option<u16>,
    pub bed_temperature: Option<u16>,
    pub max_temperature: Option<u16>,
    pub min_temperature: Option<u16>,
    /// g/cm³.
    pub density: Option<f32>,
    pub material_id: Option<String>,
    pub material_variant_id: Option<String>,
    pub vendor_code: Option<String>,
    pub batch_code: Option<String>,
    pub production_date: Option<String>,
}
