use std::collections::HashMap;

/// A per-key before/after description of a changed property, as returned by
/// a provider that supports detailed diffs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DetailedDiffEntry {
    pub input_diff: bool,
}

/// The outcome of a provider's Diff RPC.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct DiffResult {
    pub stable_keys: Vec<String>,
    pub changed_keys: Vec<String>,
    pub replace_keys: Vec<String>,
    pub delete_before_replace: bool,
    pub detailed: Option<HashMap<String, DetailedDiffEntry>>,
}

impl DiffResult {
    /// No changes at all: neither a changed nor a replace key.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether this diff requires a replacement rather than an in-place update.
    pub fn requires_replace(&self) -> bool {
        !self.replace_keys.is_empty()
    }

    /// Whether this diff requires any change at all (Update or Replace).
    pub fn has_changes(&self) -> bool {
        self.requires_replace() || !self.changed_keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diff_has_no_changes() {
        let d = DiffResult::none();
        assert!(!d.has_changes());
        assert!(!d.requires_replace());
    }

    #[test]
    fn replace_keys_imply_replace_and_changes() {
        let d = DiffResult {
            replace_keys: vec!["size".into()],
            ..Default::default()
        };
        assert!(d.requires_replace());
        assert!(d.has_changes());
    }

    #[test]
    fn changed_keys_without_replace_is_update_only() {
        let d = DiffResult {
            changed_keys: vec!["tags".into()],
            ..Default::default()
        };
        assert!(!d.requires_replace());
        assert!(d.has_changes());
    }
}
