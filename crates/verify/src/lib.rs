//! Post-redaction verification checks.
//!
//! Redaction must never change document structure: a PDF keeps its page count, an image keeps
//! its dimensions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Pdf,
    Raster,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResult {
    pub ok: bool,
    pub warnings: Vec<String>,
}

impl VerifyResult {
    fn from_warnings(warnings: Vec<String>) -> Self {
        for warning in &warnings {
            log::warn!("[Verify] {}", warning);
        }
        Self {
            ok: warnings.is_empty(),
            warnings,
        }
    }
}

pub fn verify_output(original: &[u8], redacted: &[u8], kind: ArtifactKind) -> VerifyResult {
    let warnings = match kind {
        ArtifactKind::Pdf => verify_pdf(original, redacted),
        ArtifactKind::Raster => verify_raster(original, redacted),
    };
    VerifyResult::from_warnings(warnings)
}

fn verify_pdf(original: &[u8], redacted: &[u8]) -> Vec<String> {
    let mut warnings = Vec::new();
    match (veil_pdf::page_count(original), veil_pdf::page_count(redacted)) {
        (Ok(before), Ok(after)) if before != after => {
            warnings.push(format!("page count changed: {} -> {}", before, after));
        }
        (Ok(_), Ok(_)) => {}
        (_, Err(e)) => warnings.push(format!("redacted output unreadable: {}", e)),
        (Err(e), _) => warnings.push(format!("original unreadable: {}", e)),
    }
    warnings
}

fn verify_raster(original: &[u8], redacted: &[u8]) -> Vec<String> {
    let mut warnings = Vec::new();
    match (
        veil_render::sniff_dimensions(original),
        veil_render::sniff_dimensions(redacted),
    ) {
        (Some(before), Some(after)) if before != after => {
            warnings.push(format!(
                "image dimensions changed: {}x{} -> {}x{}",
                before.0, before.1, after.0, after.1
            ));
        }
        (Some(_), Some(_)) => {}
        (_, None) => warnings.push("redacted output is not a readable image".to_string()),
        (None, _) => warnings.push("original is not a readable image".to_string()),
    }
    warnings
}
