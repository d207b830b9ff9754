//! Fallback for tags whose format was not recognized.

use crate::error::InterpretationError;
use crate::types::{DecryptedScanData, FilamentInfo};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenericInterpreter;

impl GenericInterpreter {
    pub fn decode(&self, data: &DecryptedScanData) -> Result<FilamentInfo, InterpretationError> {
        Err(InterpretationError::Unsupported(data.format.to_string()))
    }
}
