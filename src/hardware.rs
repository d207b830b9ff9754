//! Platform-neutral tag session interface.

use crate::error::HardwareError;
use crate::types::{Block, KeyVariant, SectorKey, TagUid};

/// Structural properties of a discovered tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDescriptor {
    pub uid: TagUid,
    /// Technology names reported by the platform (e.g. `"MifareClassic"`, `"Ndef"`).
    pub technologies: Vec<String>,
    pub sector_count: Option<u8>,
    pub block_count: Option<u16>,
    /// Bytes available without authentication (cached NDEF message), if any.
    pub payload: Option<Vec<u8>>,
}

/// One open hardware session with a physical tag.
///
/// Implemented per platform. Calls happen on a background thread, strictly
/// sequentially; only one reader holds a given session at a time.
/// Session loss must be reported as [`HardwareError::TagLost`], never as an
/// empty read.
pub trait HardwareAdapter: Send {
    fn descriptor(&self) -> Result<TagDescriptor, HardwareError>;

    fn connect(&mut self) -> Result<(), HardwareError>;

    /// `Ok(false)` when the tag rejects the key.
    fn authenticate_sector(
        &mut self,
        sector: u8,
        key: &SectorKey,
        variant: KeyVariant,
    ) -> Result<bool, HardwareError>;

    fn read_block(&mut self, block: u8) -> Result<Block, HardwareError>;

    fn close(&mut self);
}
