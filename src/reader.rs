//! Authenticated sector-by-sector reading with partial-failure tracking.
//!
//! Every sector is attempted even after others fail. A rejected sector
//! contributes no blocks; a failed block read inside an authenticated sector
//! is replaced by zeros. Only session loss stops the loop early, and the data
//! already read is kept.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::ScannerConfig;
use crate::error::{AuthenticationError, BlockReadError, HardwareError};
use crate::hardware::HardwareAdapter;
use crate::interpret;
use crate::types::{
    DecryptedScanData, DerivedKeySet, KeyVariant, RawBlockMap, ScanResult, ScanStage, ScanTiming,
    SectorAuthResult, SectorKey, TagFormat, TagTechnology, TagUid, BLOCKS_PER_SECTOR, BLOCK_SIZE,
    SECTOR_COUNT,
};

/// Result of trying both key variants on one sector.
enum SectorAttempt {
    Authenticated(KeyVariant),
    Rejected(Vec<AuthenticationError>),
    SessionLost,
}

pub struct AuthenticatedReader {
    try_key_b: bool,
    zero_fill_failed_blocks: bool,
    ndef_max_blocks: u8,
}

impl Default for AuthenticatedReader {
    fn default() -> Self {
        Self::new(&ScannerConfig::default())
    }
}

impl AuthenticatedReader {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            try_key_b: config.try_key_b,
            zero_fill_failed_blocks: config.zero_fill_failed_blocks,
            ndef_max_blocks: config.ndef_max_blocks,
        }
    }

    /// Authenticate and read all 16 sectors of a 1K card.
    ///
    /// The adapter must already be connected. Emits `Authenticating`, then
    /// `ReadingBlocks` once the first sector opens.
    pub fn read_sectors(
        &self,
        adapter: &mut dyn HardwareAdapter,
        uid: &TagUid,
        keys: &DerivedKeySet,
        format: TagFormat,
        progress: &mut dyn FnMut(ScanStage),
    ) -> (DecryptedScanData, Vec<SectorAuthResult>) {
        let mut blocks = RawBlockMap::new();
        let mut auth_results = Vec::with_capacity(SECTOR_COUNT);
        let mut authenticated = Vec::new();
        let mut failed = Vec::new();
        let mut key_types = BTreeMap::new();
        let mut errors = Vec::new();
        let mut aborted = false;
        let mut auth_time = Duration::ZERO;
        let mut read_time = Duration::ZERO;
        let mut reading_announced = false;

        progress(ScanStage::Authenticating);

        'sectors: for (index, key) in keys.keys().iter().enumerate() {
            let sector = index as u8;

            let started = Instant::now();
            let attempt = self.authenticate(adapter, sector, key);
            auth_time += started.elapsed();

            let variant = match attempt {
                SectorAttempt::Authenticated(variant) => variant,
                SectorAttempt::Rejected(reasons) => {
                    tracing::debug!(uid = %uid, sector, "sector authentication failed");
                    auth_results.push(SectorAuthResult {
                        sector,
                        success: false,
                        key_variant: None,
                    });
                    failed.push(sector);
                    errors.extend(reasons.iter().map(ToString::to_string));
                    continue;
                }
                SectorAttempt::SessionLost => {
                    tracing::warn!(uid = %uid, sector, "tag lost during authentication");
                    auth_results.push(SectorAuthResult {
                        sector,
                        success: false,
                        key_variant: None,
                    });
                    failed.push(sector);
                    errors.push(
                        AuthenticationError::Hardware {
                            sector,
                            source: HardwareError::TagLost,
                        }
                        .to_string(),
                    );
                    aborted = true;
                    break 'sectors;
                }
            };

            auth_results.push(SectorAuthResult {
                sector,
                success: true,
                key_variant: Some(variant),
            });
            authenticated.push(sector);
            key_types.insert(sector, variant);

            if !reading_announced {
                progress(ScanStage::ReadingBlocks);
                reading_announced = true;
            }

            let started = Instant::now();
            let first = index * BLOCKS_PER_SECTOR;
            // The last block of each sector is the trailer (keys + access bits).
            for block in first..first + BLOCKS_PER_SECTOR - 1 {
                let block = block as u8;
                match adapter.read_block(block) {
                    Ok(data) => {
                        blocks.insert(block, data);
                    }
                    Err(e) if e.is_session_lost() => {
                        tracing::warn!(uid = %uid, block, "tag lost during block read");
                        errors.push(BlockReadError { block, source: e }.to_string());
                        aborted = true;
                        read_time += started.elapsed();
                        break 'sectors;
                    }
                    Err(e) => {
                        tracing::warn!(uid = %uid, block, error = %e, "block read failed");
                        errors.push(BlockReadError { block, source: e }.to_string());
                        if self.zero_fill_failed_blocks {
                            blocks.insert(block, [0u8; BLOCK_SIZE]);
                        }
                    }
                }
            }
            read_time += started.elapsed();
        }

        let mut data = DecryptedScanData {
            uid: uid.clone(),
            technology: TagTechnology::MifareClassic1k,
            format,
            blocks,
            authenticated_sectors: authenticated,
            failed_sectors: failed,
            sector_key_types: key_types,
            derived_keys: Some(keys.clone()),
            errors,
            aborted,
            result: ScanResult::UnknownError,
            timing: ScanTiming {
                authentication: auth_time,
                reading: read_time,
                ..ScanTiming::default()
            },
            timestamp: Utc::now(),
        };
        data.result = classify(&data);

        tracing::debug!(
            uid = %uid,
            authenticated = data.authenticated_sectors.len(),
            failed = data.failed_sectors.len(),
            blocks = data.blocks.len(),
            result = %data.result,
            "sector read finished"
        );
        (data, auth_results)
    }

    /// Read an NDEF-capable tag without authentication, 16 bytes at a time,
    /// stopping at the first failed read.
    pub fn read_plain(
        &self,
        adapter: &mut dyn HardwareAdapter,
        uid: &TagUid,
        format: TagFormat,
        progress: &mut dyn FnMut(ScanStage),
    ) -> DecryptedScanData {
        progress(ScanStage::ReadingBlocks);

        let started = Instant::now();
        let mut blocks = RawBlockMap::new();
        let mut errors = Vec::new();
        let mut aborted = false;

        for block in 0..self.ndef_max_blocks {
            match adapter.read_block(block) {
                Ok(data) => {
                    blocks.insert(block, data);
                }
                Err(e) => {
                    // Reading past the end of user memory is how an NDEF read ends.
                    tracing::debug!(uid = %uid, block, error = %e, "plain read stopped");
                    aborted = e.is_session_lost();
                    if aborted || blocks.is_empty() {
                        errors.push(BlockReadError { block, source: e }.to_string());
                    }
                    break;
                }
            }
        }

        let mut data = DecryptedScanData {
            uid: uid.clone(),
            technology: TagTechnology::Ndef,
            format,
            blocks,
            authenticated_sectors: Vec::new(),
            failed_sectors: Vec::new(),
            sector_key_types: BTreeMap::new(),
            derived_keys: None,
            errors,
            aborted,
            result: ScanResult::UnknownError,
            timing: ScanTiming {
                reading: started.elapsed(),
                ..ScanTiming::default()
            },
            timestamp: Utc::now(),
        };
        data.result = classify(&data);
        data
    }

    fn authenticate(
        &self,
        adapter: &mut dyn HardwareAdapter,
        sector: u8,
        key: &SectorKey,
    ) -> SectorAttempt {
        let variants: &[KeyVariant] = if self.try_key_b {
            &[KeyVariant::A, KeyVariant::B]
        } else {
            &[KeyVariant::A]
        };

        let mut reasons = Vec::new();
        for &variant in variants {
            match adapter.authenticate_sector(sector, key, variant) {
                Ok(true) => return SectorAttempt::Authenticated(variant),
                Ok(false) => {}
                Err(e) if e.is_session_lost() => return SectorAttempt::SessionLost,
                Err(e) => {
                    tracing::debug!(sector, %variant, error = %e, "authentication error");
                    reasons.push(AuthenticationError::Hardware { sector, source: e });
                }
            }
        }
        if reasons.is_empty() {
            reasons.push(AuthenticationError::Rejected { sector });
        }
        SectorAttempt::Rejected(reasons)
    }
}

/// Classify a read against the blocks its format needs.
///
/// Aborted reads are `AuthenticationFailed` when no sector opened and
/// `UnknownError` otherwise; all 16 sectors are never required for `Success`.
pub fn classify(data: &DecryptedScanData) -> ScanResult {
    let sector_card = data.technology == TagTechnology::MifareClassic1k;
    if data.aborted {
        return if sector_card && data.authenticated_sectors.is_empty() {
            ScanResult::AuthenticationFailed
        } else {
            ScanResult::UnknownError
        };
    }
    if sector_card && data.authenticated_sectors.is_empty() {
        return ScanResult::AuthenticationFailed;
    }
    if data.blocks.is_empty() || !interpret::has_required_data(data) {
        return ScanResult::InsufficientData;
    }
    ScanResult::Success
}
