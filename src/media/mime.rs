//! Container/codec candidates and media type helpers

use super::traits::MediaBackend;

/// Media type used when nothing more specific is known
pub const FALLBACK_MEDIA_TYPE: &str = "video/webm";

/// Encoder candidates, most capable first
pub const DEFAULT_CANDIDATES: [&str; 6] = [
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
    // Rarely accepted by encoders, kept as last resort
    "video/mp4",
];

/// Default candidate list as owned strings (for configuration)
pub fn default_candidates() -> Vec<String> {
    DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect()
}

/// Filter candidates down to those the backend supports, preserving order
pub fn supported_candidates(backend: &dyn MediaBackend, candidates: &[String]) -> Vec<String> {
    candidates
        .iter()
        .filter(|c| backend.is_type_supported(c))
        .cloned()
        .collect()
}

/// File extension for a media type
pub fn extension_for(media_type: &str) -> &'static str {
    if media_type.is_empty() {
        return "webm";
    }
    if media_type.contains("mp4") {
        "mp4"
    } else if media_type.contains("webm") {
        "webm"
    } else {
        "bin"
    }
}

/// Human readable byte count
pub fn pretty_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
