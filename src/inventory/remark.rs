//! Packing of extra sample items into the primary remark cell.
//!
//! A remark cell with extras holds `<remark>\n[ExtraSamples]:<json array>`.
//! Cells without the marker are plain remarks. Decoding never fails: a
//! marker followed by anything other than a JSON array of sample items is
//! treated as plain remark text.

use crate::inventory::record::SampleItem;

/// Marker separating the main remark from the packed extras.
pub const EXTRA_SAMPLES_MARKER: &str = "[ExtraSamples]:";

/// Decoded remark cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRemark {
    pub remark: String,
    pub extra_samples: Vec<SampleItem>,
}

/// Encode `primary_remark` plus the non-blank `extras` into one cell value.
pub fn build_remark(primary_remark: &str, extras: &[SampleItem]) -> String {
    let extras: Vec<&SampleItem> = extras.iter().filter(|item| !item.is_blank()).collect();
    if extras.is_empty() {
        return primary_remark.to_string();
    }
    match serde_json::to_string(&extras) {
        Ok(json) => format!("{primary_remark}\n{EXTRA_SAMPLES_MARKER}{json}"),
        Err(e) => {
            tracing::warn!("Failed to encode extra samples, keeping remark only: {}", e);
            primary_remark.to_string()
        }
    }
}

/// Split a stored remark cell back into the main remark and extra samples.
///
/// The first marker followed by a readable sample array splits the cell, so
/// marker text typed into the main remark or into an extra's remark survives.
pub fn parse_remark(raw: &str) -> ParsedRemark {
    let mut last_err = None;
    for (marker_idx, _) in raw.match_indices(EXTRA_SAMPLES_MARKER) {
        let tail = raw[marker_idx + EXTRA_SAMPLES_MARKER.len()..].trim();
        match serde_json::from_str::<Vec<SampleItem>>(tail) {
            Ok(extra_samples) => {
                return ParsedRemark {
                    remark: raw[..marker_idx].trim().to_string(),
                    extra_samples,
                };
            }
            Err(e) => last_err = Some(e),
        }
    }

    if let Some(e) = last_err {
        tracing::warn!("Unreadable extra samples in remark cell, keeping it as text: {}", e);
    }
    ParsedRemark {
        remark: raw.to_string(),
        extra_samples: Vec::new(),
    }
}
