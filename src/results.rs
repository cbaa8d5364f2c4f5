//! Editable recognition results
//!
//! Users correct OCR output before exporting it. Each entry remembers the
//! text the engine produced so an edit can be undone.

use serde::Serialize;

use crate::recognition::OcrRegionResult;

/// One result plus its edit state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableResult {
    #[serde(flatten)]
    pub result: OcrRegionResult,
    pub is_edited: bool,
    pub original_text: String,
}

impl From<OcrRegionResult> for EditableResult {
    fn from(result: OcrRegionResult) -> Self {
        let original_text = result.text.clone();
        Self {
            result,
            is_edited: false,
            original_text,
        }
    }
}

/// Summary figures for a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultStatistics {
    pub edited_count: usize,
    pub total_count: usize,
    /// Mean confidence rounded to the nearest integer
    pub average_confidence: u32,
    /// Characters across all current texts
    pub total_characters: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    entries: Vec<EditableResult>,
}

impl ResultSet {
    pub fn new(results: Vec<OcrRegionResult>) -> Self {
        Self {
            entries: results.into_iter().map(EditableResult::from).collect(),
        }
    }

    pub fn entries(&self) -> &[EditableResult] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Replace the text of one region. Returns false for unknown regions.
    pub fn edit(&mut self, region_id: &str, text: &str) -> bool {
        let Some(entry) = self.find_mut(region_id) else {
            return false;
        };
        entry.result.text = text.to_string();
        entry.is_edited = entry.result.text != entry.original_text;
        true
    }

    /// Restore the engine's text for one region
    pub fn reset(&mut self, region_id: &str) -> bool {
        let Some(entry) = self.find_mut(region_id) else {
            return false;
        };
        entry.result.text = entry.original_text.clone();
        entry.is_edited = false;
        true
    }

    pub fn reset_all(&mut self) {
        for entry in &mut self.entries {
            entry.result.text = entry.original_text.clone();
            entry.is_edited = false;
        }
    }

    pub fn remove(&mut self, region_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.result.region_id != region_id);
        self.entries.len() != before
    }

    pub fn statistics(&self) -> ResultStatistics {
        let total_count = self.entries.len();
        let confidence_sum: f32 = self.entries.iter().map(|e| e.result.confidence).sum();

        ResultStatistics {
            edited_count: self.entries.iter().filter(|e| e.is_edited).count(),
            total_count,
            average_confidence: if total_count == 0 {
                0
            } else {
                (confidence_sum / total_count as f32).round().max(0.0) as u32
            },
            total_characters: self
                .entries
                .iter()
                .map(|e| e.result.text.chars().count())
                .sum(),
        }
    }

    /// Current texts, edits applied
    pub fn results(&self) -> Vec<OcrRegionResult> {
        self.entries.iter().map(|e| e.result.clone()).collect()
    }

    pub fn into_results(self) -> Vec<OcrRegionResult> {
        self.entries.into_iter().map(|e| e.result).collect()
    }

    fn find_mut(&mut self, region_id: &str) -> Option<&mut EditableResult> {
        self.entries.iter_mut().find(|e| e.result.region_id == region_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, text: &str, confidence: f32) -> OcrRegionResult {
        OcrRegionResult {
            region_id: id.to_string(),
            region_name: format!("Name {id}"),
            text: text.to_string(),
            confidence,
            processing_time_ms: 5,
        }
    }

    fn set() -> ResultSet {
        ResultSet::new(vec![
            result("a", "山田太郎", 91.0),
            result("b", "42", 80.0),
            result("c", "", 0.0),
        ])
    }

    #[test]
    fn test_edit_and_reset() {
        let mut results = set();

        assert!(results.edit("b", "43"));
        assert!(results.entries()[1].is_edited);
        assert_eq!(results.entries()[1].original_text, "42");

        // Editing back to the original clears the flag
        assert!(results.edit("b", "42"));
        assert!(!results.entries()[1].is_edited);

        results.edit("a", "山田花子");
        assert!(results.reset("a"));
        assert_eq!(results.entries()[0].result.text, "山田太郎");

        assert!(!results.edit("missing", "x"));
        assert!(!results.reset("missing"));
    }

    #[test]
    fn test_reset_all_and_remove() {
        let mut results = set();
        results.edit("a", "x");
        results.edit("c", "y");
        results.reset_all();
        assert_eq!(results.statistics().edited_count, 0);

        assert!(results.remove("b"));
        assert!(!results.remove("b"));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_statistics() {
        let mut results = set();
        results.edit("c", "abc");

        let stats = results.statistics();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.edited_count, 1);
        // (91 + 80 + 0) / 3 = 57
        assert_eq!(stats.average_confidence, 57);
        assert_eq!(stats.total_characters, 4 + 2 + 3);

        assert_eq!(ResultSet::default().statistics(), ResultStatistics::default());
    }

    #[test]
    fn test_into_results_applies_edits() {
        let mut results = set();
        results.edit("b", "99");
        let texts: Vec<_> = results.into_results().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["山田太郎", "99", ""]);
    }
}
