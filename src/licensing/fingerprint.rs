//! Hardware fingerprint matching.
//!
//! Fingerprints are hyphen-delimited segments (e.g. `A1B2-C3D4-E5F6-0789`).
//! Two fingerprints match when they are identical, or when they have the same
//! number of segments and at most `max_differing_segments` of them differ.

const SEGMENT_DELIMITER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintPolicy {
    pub max_differing_segments: usize,
}

impl Default for FingerprintPolicy {
    fn default() -> Self {
        Self {
            max_differing_segments: 2,
        }
    }
}

impl FingerprintPolicy {
    pub fn new(max_differing_segments: usize) -> Self {
        Self {
            max_differing_segments,
        }
    }

    /// Whether `presented` is acceptable for a license bound to `stored`.
    ///
    /// An empty `stored` fingerprint is unbound and accepts anything.
    pub fn matches(&self, stored: &str, presented: &str) -> bool {
        if stored.is_empty() || stored == presented {
            return true;
        }

        let stored_segments: Vec<&str> = stored.split(SEGMENT_DELIMITER).collect();
        let presented_segments: Vec<&str> = presented.split(SEGMENT_DELIMITER).collect();

        if stored_segments.len() != presented_segments.len() {
            return false;
        }

        let differing = stored_segments
            .iter()
            .zip(&presented_segments)
            .filter(|(a, b)| a != b)
            .count();

        differing <= self.max_differing_segments
    }
}
