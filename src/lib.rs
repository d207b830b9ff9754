//! spooltag: filament spool RFID tag decoding.
//!
//! Detects the tag's format, derives per-sector keys from the UID (cached),
//! reads every sector it can authenticate, and decodes the blocks into a
//! [`FilamentInfo`]. Hardware access goes through [`HardwareAdapter`];
//! the whole pipeline is driven by [`ScanOrchestrator`].

pub mod cache;
pub mod clock;
pub mod config;
pub mod detect;
pub mod error;
pub mod hardware;
pub mod interpret;
pub mod keys;
pub mod reader;
pub mod scan;
pub mod types;

pub use cache::{CacheStatistics, KeyDerivationCache, KeyStore, MemoryKeyStore};
#[cfg(feature = "sqlite")]
pub use cache::sqlite::SqliteKeyStore;
pub use config::{CacheConfig, ScannerConfig};
pub use error::{HardwareError, InterpretationError, KeyDerivationError};
pub use hardware::{HardwareAdapter, TagDescriptor};
pub use interpret::Interpreter;
pub use keys::derive_keys;
pub use reader::AuthenticatedReader;
pub use scan::{diagnostics, ScanObserver, ScanOrchestrator, ScanOutcome};
pub use types::{
    DecryptedScanData, DerivedKeySet, EncryptedScanData, FilamentInfo, KeyVariant, ScanResult,
    ScanStage, SectorKey, TagDetectionResult, TagFormat, TagTechnology, TagUid,
};
