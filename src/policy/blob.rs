//! Codec for the per-account custom-attribute blob.
//!
//! The blob is a JSON array of `(definition_id, value_id)` selections. It is
//! opaque everywhere else in the crate; nothing may assume its field order
//! or format beyond what the two functions here expose.

use serde::{Deserialize, Serialize};

use super::attributes::{AttributeDefinition, AttributeValue};
use super::error::PolicyError;

/// One selection in the blob: a definition and the chosen permitted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub definition_id: uuid::Uuid,
    pub value_id: uuid::Uuid,
}

/// Decode the blob into its ordered selections.
///
/// An absent or blank blob decodes to no selections; anything else that is
/// not valid JSON in the expected shape is a [`PolicyError::MalformedBlob`].
pub fn decode_selections(blob: Option<&str>) -> Result<Vec<Selection>, PolicyError> {
    let Some(raw) = blob else {
        return Ok(Vec::new());
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|err| PolicyError::MalformedBlob(err.to_string()))
}

/// Re-encode the blob with the selection for `definition` set to `value`,
/// added if absent and replaced if present. All unrelated selections are
/// preserved in their original order.
pub fn encode_with_selection(
    blob: Option<&str>,
    definition: &AttributeDefinition,
    value: &AttributeValue,
) -> Result<String, PolicyError> {
    let mut selections = decode_selections(blob)?;

    match selections
        .iter_mut()
        .find(|selection| selection.definition_id == definition.id)
    {
        Some(selection) => selection.value_id = value.id,
        None => selections.push(Selection {
            definition_id: definition.id,
            value_id: value.id,
        }),
    }

    serde_json::to_string(&selections).map_err(|err| PolicyError::MalformedBlob(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn definition_with_value() -> (AttributeDefinition, AttributeValue) {
        let value = AttributeValue {
            id: Uuid::new_v4(),
            name: "Yes".to_string(),
            display_order: 0,
            is_pre_selected: true,
        };
        let definition = AttributeDefinition {
            id: Uuid::new_v4(),
            name: "RequirePasswordChange".to_string(),
            values: vec![value.clone()],
        };
        (definition, value)
    }

    #[test]
    fn absent_and_blank_blobs_decode_empty() {
        assert_eq!(decode_selections(None).ok(), Some(Vec::new()));
        assert_eq!(decode_selections(Some("")).ok(), Some(Vec::new()));
        assert_eq!(decode_selections(Some("   ")).ok(), Some(Vec::new()));
    }

    #[test]
    fn garbage_blob_is_malformed() {
        let result = decode_selections(Some("<Attributes></Attributes>"));
        assert!(matches!(result, Err(PolicyError::MalformedBlob(_))));

        let result = decode_selections(Some(r#"{"definition_id": 1}"#));
        assert!(matches!(result, Err(PolicyError::MalformedBlob(_))));
    }

    #[test]
    fn encode_adds_selection_when_absent() -> Result<(), PolicyError> {
        let (definition, value) = definition_with_value();
        let blob = encode_with_selection(None, &definition, &value)?;
        let selections = decode_selections(Some(&blob))?;
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].definition_id, definition.id);
        assert_eq!(selections[0].value_id, value.id);
        Ok(())
    }

    #[test]
    fn encode_replaces_selection_in_place() -> Result<(), PolicyError> {
        let (definition, value) = definition_with_value();
        let other = Selection {
            definition_id: Uuid::new_v4(),
            value_id: Uuid::new_v4(),
        };
        let existing = vec![
            other.clone(),
            Selection {
                definition_id: definition.id,
                value_id: Uuid::new_v4(),
            },
        ];
        let blob = serde_json::to_string(&existing).map_err(|e| {
            PolicyError::MalformedBlob(e.to_string())
        })?;

        let updated = encode_with_selection(Some(&blob), &definition, &value)?;
        let selections = decode_selections(Some(&updated))?;

        assert_eq!(selections.len(), 2);
        // unrelated selection untouched, order preserved
        assert_eq!(selections[0], other);
        assert_eq!(selections[1].definition_id, definition.id);
        assert_eq!(selections[1].value_id, value.id);
        Ok(())
    }
}
