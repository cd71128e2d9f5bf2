//! Edit commands issued by editable pages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clock::Timestamp;
use crate::slice::FieldValue;

/// Field name to new value.
pub type FieldPatches = BTreeMap<String, FieldValue>;

/// A request to mutate one record in one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditCommand {
    pub slice_name: String,
    pub record_key: String,
    pub field_patches: FieldPatches,
    /// When the user made the edit
    pub originated_at: Timestamp,
}

impl EditCommand {
    /// Creates an edit command without patches.
    pub fn new(
        slice_name: impl Into<String>,
        record_key: impl Into<String>,
        originated_at: Timestamp,
    ) -> Self {
        Self {
            slice_name: slice_name.into(),
            record_key: record_key.into(),
            field_patches: FieldPatches::new(),
            originated_at,
        }
    }

    /// Adds a field patch.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.field_patches.insert(field.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::timestamp_secs;
    use serde_json::json;

    #[test]
    fn test_builder_collects_patches() {
        let cmd = EditCommand::new("expenses", "r1", timestamp_secs(10))
            .set("amount", 500)
            .set("category", "travel")
            .set("meta", json!({"approved": true}));

        assert_eq!(cmd.field_patches.len(), 3);
        assert_eq!(cmd.field_patches["amount"], json!(500));
        assert_eq!(cmd.field_patches["category"], json!("travel"));
    }
}
