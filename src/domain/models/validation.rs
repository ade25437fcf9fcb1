//! Validation outcomes.

use serde::{Deserialize, Serialize};

/// Result of validating one candidate item against a world state.
///
/// Time conflicts and availability violations make the result invalid;
/// capacity issues are warnings unless the hard capacity policy is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub conflicts: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    /// Ids of existing items the candidate overlaps.
    pub conflicting_item_ids: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            conflicts: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            conflicting_item_ids: Vec::new(),
        }
    }

    /// Record a hard failure.
    pub fn add_conflict(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.conflicts.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn add_suggestion(&mut self, message: impl Into<String>) {
        self.suggestions.push(message.into());
    }

    pub fn has_time_conflicts(&self) -> bool {
        !self.conflicting_item_ids.is_empty()
    }
}

/// Validation outcome for one item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemValidation {
    pub item_id: String,
    pub result: ValidationResult,
}

/// Two batch members that overlap each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalConflict {
    pub first_id: String,
    pub second_id: String,
}

/// Result of validating a batch of new items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BatchValidation {
    /// Per-item results, in input order.
    pub items: Vec<ItemValidation>,
    pub internal_conflicts: Vec<InternalConflict>,
}

impl BatchValidation {
    pub fn is_valid(&self) -> bool {
        self.internal_conflicts.is_empty() && self.items.iter().all(|i| i.result.is_valid)
    }

    /// Ids of items whose own validation failed, in input order.
    pub fn invalid_item_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| !i.result.is_valid)
            .map(|i| i.item_id.clone())
            .collect()
    }

    /// Ids involved in any internal conflict, sorted and deduplicated.
    pub fn internally_conflicting_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .internal_conflicts
            .iter()
            .flat_map(|c| [c.first_id.clone(), c.second_id.clone()])
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn result_for(&self, item_id: &str) -> Option<&ValidationResult> {
        self.items
            .iter()
            .find(|i| i.item_id == item_id)
            .map(|i| &i.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_invalidates_warning_does_not() {
        let mut result = ValidationResult::valid();
        result.add_warning("close to daily limit");
        assert!(result.is_valid);
        result.add_conflict("overlaps 'standup'");
        assert!(!result.is_valid);
        assert_eq!(result.conflicts.len(), 1);
    }

    #[test]
    fn test_batch_ids() {
        let batch = BatchValidation {
            items: vec![
                ItemValidation { item_id: "b".into(), result: ValidationResult::valid() },
                ItemValidation { item_id: "a".into(), result: ValidationResult::valid() },
            ],
            internal_conflicts: vec![InternalConflict {
                first_id: "b".into(),
                second_id: "a".into(),
            }],
        };
        assert!(!batch.is_valid());
        assert!(batch.invalid_item_ids().is_empty());
        assert_eq!(batch.internally_conflicting_ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
