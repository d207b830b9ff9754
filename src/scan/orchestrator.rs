use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::KeyDerivationCache;
use crate::config::ScannerConfig;
use crate::detect::{self, detect, refine_with_blocks};
use crate::error::DetectionError;
use crate::hardware::{HardwareAdapter, TagDescriptor};
use crate::interpret::Interpreter;
use crate::reader::{classify, AuthenticatedReader};
use crate::types::{
    DecryptedScanData, EncryptedScanData, FilamentInfo, ScanResult, ScanStage, ScanTiming,
    SectorAuthResult, TagDetectionResult, TagFormat, TagTechnology, TagUid,
};

/// Receives every stage transition of a scan.
pub type ScanObserver = Arc<dyn Fn(ScanStage) + Send + Sync>;

/// Random v4 UUID string.
pub fn generate_scan_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Everything one scan produced.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub detection: TagDetectionResult,
    /// Raw capture; `None` when no tag was present.
    pub encrypted: Option<EncryptedScanData>,
    pub decrypted: DecryptedScanData,
    pub filament: Option<FilamentInfo>,
    pub sector_results: Vec<SectorAuthResult>,
    pub stages: Vec<ScanStage>,
}

impl ScanOutcome {
    pub fn result(&self) -> ScanResult {
        self.decrypted.result
    }
}

struct StageLog<'a> {
    stages: Vec<ScanStage>,
    observer: Option<&'a (dyn Fn(ScanStage) + Send + Sync)>,
}

impl StageLog<'_> {
    fn emit(&mut self, stage: ScanStage) {
        tracing::debug!(?stage, "scan stage");
        self.stages.push(stage);
        if let Some(observer) = self.observer {
            observer(stage);
        }
    }
}

/// Runs detect, derive, authenticate, read and interpret for one tag.
///
/// Never panics and never returns an error: every failure ends up in the
/// outcome's [`ScanResult`] and error list.
pub struct ScanOrchestrator {
    config: ScannerConfig,
    cache: Arc<KeyDerivationCache>,
    reader: AuthenticatedReader,
    observer: Option<ScanObserver>,
}

impl ScanOrchestrator {
    pub fn new(config: ScannerConfig, cache: Arc<KeyDerivationCache>) -> Self {
        Self {
            reader: AuthenticatedReader::new(&config),
            config,
            cache,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl Fn(ScanStage) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<KeyDerivationCache> {
        &self.cache
    }

    /// Scan the tag behind `adapter`, or report `NoNfcTag` for `None`.
    pub fn scan(&self, adapter: Option<&mut dyn HardwareAdapter>) -> ScanOutcome {
        let mut log = StageLog {
            stages: Vec::new(),
            observer: self.observer.as_deref(),
        };
        let Some(adapter) = adapter else {
            tracing::debug!("scan requested without a tag");
            log.emit(ScanStage::Error);
            return ScanOutcome {
                detection: TagDetectionResult {
                    format: TagFormat::Unknown,
                    technology: TagTechnology::Unknown,
                    confidence: 0.0,
                    reason: "No tag present".to_string(),
                    manufacturer: None,
                },
                encrypted: None,
                decrypted: DecryptedScanData::empty(TagUid::default(), ScanResult::NoNfcTag),
                filament: None,
                sector_results: Vec::new(),
                stages: log.stages,
            };
        };

        let started = Instant::now();
        let descriptor = adapter.descriptor();
        let (mut detection, descriptor) = match descriptor {
            Ok(d) => (detect(&d, None), d),
            Err(e) => {
                let error = DetectionError::from(e);
                tracing::warn!(error = %error, "tag detection failed");
                (detect::failed(&error), TagDescriptor::default())
            }
        };
        log.emit(ScanStage::TagDetected);
        tracing::debug!(
            uid = %descriptor.uid,
            format = %detection.format,
            technology = %detection.technology,
            confidence = detection.confidence,
            "tag detected"
        );

        let uid = descriptor.uid.clone();
        let mut key_derivation = Duration::ZERO;
        let mut sector_results = Vec::new();

        log.emit(ScanStage::Connecting);
        let data = match adapter.connect() {
            Err(e) => {
                tracing::warn!(uid = %uid, error = %e, "connect failed");
                let mut data = DecryptedScanData::empty(uid.clone(), ScanResult::UnknownError);
                data.technology = detection.technology;
                data.format = detection.format;
                data.errors.push(format!("Connect failed: {e}"));
                data
            }
            Ok(()) => match detection.technology {
                TagTechnology::MifareClassic1k => {
                    log.emit(ScanStage::KeyDerivation);
                    let derive_started = Instant::now();
                    let keys = self.cache.get_or_derive(&uid);
                    key_derivation = derive_started.elapsed();
                    match keys {
                        Err(e) => {
                            tracing::warn!(uid = %uid, error = %e, "key derivation failed");
                            let mut data =
                                DecryptedScanData::empty(uid.clone(), ScanResult::UnknownError);
                            data.technology = detection.technology;
                            data.format = detection.format;
                            data.errors.push(e.to_string());
                            data
                        }
                        Ok(keys) => {
                            let (data, results) = self.reader.read_sectors(
                                adapter,
                                &uid,
                                &keys,
                                detection.format,
                                &mut |stage| log.emit(stage),
                            );
                            sector_results = results;
                            let refined = refine_with_blocks(&detection, &data.blocks);
                            let data = reformat(data, refined.format);
                            detection = refined;
                            data
                        }
                    }
                }
                TagTechnology::Ndef => {
                    let data = self.reader.read_plain(
                        adapter,
                        &uid,
                        detection.format,
                        &mut |stage| log.emit(stage),
                    );
                    if detection.format == TagFormat::Unknown && !data.blocks.is_empty() {
                        detection = detect(&descriptor, Some(&data.concatenated()));
                    }
                    reformat(data, detection.format)
                }
                TagTechnology::Unknown => {
                    let mut data =
                        DecryptedScanData::empty(uid.clone(), ScanResult::InsufficientData);
                    data.errors.push(detection.reason.clone());
                    data
                }
            },
        };
        adapter.close();

        let (mut data, filament) = if data.result == ScanResult::Success {
            log.emit(ScanStage::Parsing);
            match Interpreter::for_format(data.format).decode(&data) {
                Ok(info) => (data, Some(info)),
                Err(e) => {
                    tracing::debug!(uid = %uid, format = %data.format, error = %e, "interpretation failed");
                    let error = e.to_string();
                    (data.reclassified(ScanResult::ParsingFailed, vec![error]), None)
                }
            }
        } else {
            (data, None)
        };
        log.emit(if filament.is_some() {
            ScanStage::Completed
        } else {
            ScanStage::Error
        });

        let total = started.elapsed();
        data.timing = ScanTiming {
            key_derivation,
            total,
            ..data.timing
        };

        let encrypted = EncryptedScanData {
            scan_id: generate_scan_id(),
            uid: uid.clone(),
            technology: data.technology,
            raw_data: data.concatenated(),
            duration: total,
            timestamp: data.timestamp,
        };

        tracing::info!(
            scan_id = %encrypted.scan_id,
            uid = %uid,
            format = %data.format,
            result = %data.result,
            blocks = data.blocks.len(),
            errors = data.errors.len(),
            elapsed_ms = total.as_millis() as u64,
            "scan finished"
        );

        ScanOutcome {
            detection,
            encrypted: Some(encrypted),
            decrypted: data,
            filament,
            sector_results,
            stages: log.stages,
        }
    }

    /// Run [`scan`](Self::scan) on the blocking pool.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn scan_in_background(
        self: Arc<Self>,
        mut adapter: Box<dyn HardwareAdapter>,
    ) -> tokio::task::JoinHandle<ScanOutcome> {
        tokio::task::spawn_blocking(move || self.scan(Some(adapter.as_mut())))
    }
}

/// Apply a refined format, re-deriving the classification when it changed.
fn reformat(data: DecryptedScanData, format: TagFormat) -> DecryptedScanData {
    if data.format == format {
        return data;
    }
    let mut data = data.with_format(format);
    data.result = classify(&data);
    data
}
