//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use spooltag::types::{Block, BLOCKS_PER_SECTOR, BLOCK_SIZE};
use spooltag::{
    derive_keys, CacheConfig, DerivedKeySet, HardwareAdapter, HardwareError, KeyDerivationCache,
    KeyVariant, ScanOrchestrator, ScannerConfig, SectorKey, TagDescriptor, TagUid,
};

// ============================================================================
// MockTag
// ============================================================================

/// Scriptable in-memory tag.
///
/// Sector cards only accept the keys derived from their UID (unless
/// `accepted_keys` is overridden) and only serve blocks of the sector that
/// was authenticated last. NDEF tags serve blocks until the data runs out.
pub struct MockTag {
    pub descriptor: TagDescriptor,
    pub blocks: BTreeMap<u8, Block>,
    pub accepted_keys: Option<DerivedKeySet>,
    pub key_b_only: HashSet<u8>,
    pub lose_at_block: Option<u8>,
    pub connect_error: Option<HardwareError>,
    pub sector_card: bool,
    pub connected: bool,
    pub closed: bool,
    authenticated: Option<u8>,
}

impl MockTag {
    pub fn classic(uid: &[u8], blocks: BTreeMap<u8, Block>) -> Self {
        let uid = TagUid::new(uid.to_vec());
        Self {
            accepted_keys: derive_keys(&uid).ok(),
            descriptor: TagDescriptor {
                uid,
                technologies: vec!["NfcA".into(), "MifareClassic".into()],
                sector_count: Some(16),
                block_count: Some(64),
                payload: None,
            },
            blocks,
            key_b_only: HashSet::new(),
            lose_at_block: None,
            connect_error: None,
            sector_card: true,
            connected: false,
            closed: false,
            authenticated: None,
        }
    }

    pub fn ndef(uid: &[u8], payload: &[u8]) -> Self {
        let blocks = payload
            .chunks(BLOCK_SIZE)
            .enumerate()
            .map(|(i, chunk)| {
                let mut block = [0u8; BLOCK_SIZE];
                block[..chunk.len()].copy_from_slice(chunk);
                (i as u8, block)
            })
            .collect();
        Self {
            descriptor: TagDescriptor {
                uid: TagUid::new(uid.to_vec()),
                technologies: vec!["NfcA".into(), "MifareUltralight".into(), "Ndef".into()],
                sector_count: None,
                block_count: None,
                payload: None,
            },
            blocks,
            accepted_keys: None,
            key_b_only: HashSet::new(),
            lose_at_block: None,
            connect_error: None,
            sector_card: false,
            connected: false,
            closed: false,
            authenticated: None,
        }
    }
}

impl HardwareAdapter for MockTag {
    fn descriptor(&self) -> Result<TagDescriptor, HardwareError> {
        Ok(self.descriptor.clone())
    }

    fn connect(&mut self) -> Result<(), HardwareError> {
        if let Some(e) = self.connect_error.clone() {
            return Err(e);
        }
        self.connected = true;
        Ok(())
    }

    fn authenticate_sector(
        &mut self,
        sector: u8,
        key: &SectorKey,
        variant: KeyVariant,
    ) -> Result<bool, HardwareError> {
        if !self.connected {
            return Err(HardwareError::NotConnected);
        }
        let expected = self
            .accepted_keys
            .as_ref()
            .and_then(|keys| keys.key(sector as usize));
        let variant_ok = match variant {
            KeyVariant::A => !self.key_b_only.contains(&sector),
            KeyVariant::B => true,
        };
        let ok = variant_ok && expected == Some(key);
        self.authenticated = ok.then_some(sector);
        Ok(ok)
    }

    fn read_block(&mut self, block: u8) -> Result<Block, HardwareError> {
        if !self.connected {
            return Err(HardwareError::NotConnected);
        }
        if self.lose_at_block == Some(block) {
            self.connected = false;
            return Err(HardwareError::TagLost);
        }
        if self.sector_card {
            if self.authenticated != Some(block / BLOCKS_PER_SECTOR as u8) {
                return Err(HardwareError::Protocol("sector not authenticated".into()));
            }
            return Ok(self.blocks.get(&block).copied().unwrap_or([0u8; BLOCK_SIZE]));
        }
        self.blocks
            .get(&block)
            .copied()
            .ok_or_else(|| HardwareError::Protocol("NAK".into()))
    }

    fn close(&mut self) {
        self.connected = false;
        self.closed = true;
    }
}

// ============================================================================
// Block fixtures
// ============================================================================

pub fn padded(text: &[u8]) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    block[..text.len()].copy_from_slice(text);
    block
}

/// Bambu layout: red PLA, 1000 g, 1.75 mm, temps 40/60/210/190.
pub fn bambu_blocks(tray: &str) -> BTreeMap<u8, Block> {
    let mut blocks = BTreeMap::new();
    blocks.insert(1, padded(b"A00-R0\0\0GFA00"));
    blocks.insert(2, padded(b"PLA"));
    blocks.insert(4, padded(b"PLA Basic"));

    let mut color = [0u8; BLOCK_SIZE];
    color[..4].copy_from_slice(&[0xFF, 0x00, 0x00, 0xFF]);
    color[4..6].copy_from_slice(&1000u16.to_le_bytes());
    color[8..12].copy_from_slice(&1.75f32.to_le_bytes());
    blocks.insert(5, color);

    let mut temps = [0u8; BLOCK_SIZE];
    for (i, v) in [40u16, 8, 1, 60, 210, 190].iter().enumerate() {
        temps[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
    }
    blocks.insert(6, temps);
    blocks.insert(9, padded(tray.as_bytes()));
    blocks
}

/// Creality ASCII record spread over blocks 4-6.
pub fn creality_blocks(record: &str) -> BTreeMap<u8, Block> {
    let mut region = [0u8; 48];
    region[..record.len()].copy_from_slice(record.as_bytes());
    region
        .chunks(BLOCK_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            (4 + i as u8, block)
        })
        .collect()
}

/// OpenTag v1 payload with the signature at offset 0.
pub fn opentag_payload(manufacturer: &str, material: &str) -> Vec<u8> {
    let mut p = vec![0u8; 96];
    p[..2].copy_from_slice(b"OT");
    p[2..2 + manufacturer.len()].copy_from_slice(manufacturer.as_bytes());
    p[18..18 + material.len()].copy_from_slice(material.as_bytes());
    p[66..70].copy_from_slice(&[0x00, 0x00, 0xFF, 0xFF]);
    p[70..72].copy_from_slice(&1750u16.to_le_bytes());
    p[72..74].copy_from_slice(&750u16.to_le_bytes());
    p
}

// ============================================================================
// Orchestrator
// ============================================================================

pub fn memory_cache() -> Arc<KeyDerivationCache> {
    Arc::new(KeyDerivationCache::memory_only(CacheConfig::default()).unwrap())
}

pub fn orchestrator() -> ScanOrchestrator {
    ScanOrchestrator::new(ScannerConfig::default(), memory_cache())
}
