//! Plain-text dump of a scan for bug reports.
//!
//! ```text
//! [scan]
//! uid: 5A010203
//! ...
//! [sectors]
//! sector_00: authenticated key=A
//! ```
//!
//! Output depends only on the record, so two exports of the same scan are
//! byte-identical.

use std::time::Duration;

use crate::types::{DecryptedScanData, TagTechnology, SECTOR_COUNT};

pub fn export(data: &DecryptedScanData) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut section = |name: &str, body: Vec<String>| {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format!("[{name}]"));
        lines.extend(body);
    };

    section(
        "scan",
        vec![
            format!("uid: {}", data.uid.to_hex()),
            format!("uid_length: {}", data.uid.len()),
            format!("technology: {}", data.technology),
            format!("format: {}", data.format),
            format!("result: {}", data.result),
            format!("aborted: {}", data.aborted),
            format!("timestamp: {}", data.timestamp.to_rfc3339()),
            format!("blocks_read: {}", data.blocks.len()),
        ],
    );

    let sectors = if data.technology == TagTechnology::MifareClassic1k {
        (0..SECTOR_COUNT as u8)
            .map(|sector| {
                let status = match data.sector_key_types.get(&sector) {
                    Some(variant) => format!("authenticated key={variant}"),
                    None if data.failed_sectors.contains(&sector) => "failed".to_string(),
                    None => "not_attempted".to_string(),
                };
                format!("sector_{sector:02}: {status}")
            })
            .collect()
    } else {
        vec!["count: 0".to_string()]
    };
    section("sectors", sectors);

    let keys = match &data.derived_keys {
        Some(keys) => keys
            .to_hex_vec()
            .into_iter()
            .enumerate()
            .map(|(i, hex)| format!("sector_{i:02}: {hex}"))
            .collect(),
        None => vec!["derived: none".to_string()],
    };
    section("keys", keys);

    let blocks = data
        .blocks
        .iter()
        .map(|(index, bytes)| {
            let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("block_{index:02}: {}", hex.join(" "))
        })
        .collect();
    section("blocks", blocks);

    let errors = if data.errors.is_empty() {
        vec!["count: 0".to_string()]
    } else {
        data.errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("error_{i:02}: {e}"))
            .collect()
    };
    section("errors", errors);

    section(
        "timing",
        vec![
            format!("key_derivation_ms: {}", millis(data.timing.key_derivation)),
            format!("authentication_ms: {}", millis(data.timing.authentication)),
            format!("reading_ms: {}", millis(data.timing.reading)),
            format!("total_ms: {}", millis(data.timing.total)),
        ],
    );

    lines.push(String::new());
    lines.join("\n")
}

fn millis(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64() * 1000.0)
}
