//! Flag transition classifier.

use tracing::debug;
use uuid::Uuid;

use super::attributes::{AttributeDefinition, ATTRIBUTES_KEY, REQUIRE_PASSWORD_CHANGE, VALUE_NO, VALUE_YES};
use super::blob::decode_selections;
use super::context::PolicyContext;
use super::error::PolicyError;

/// Derived password-change-policy state. Computed fresh from the blob on
/// every decision; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Required,
    NotRequired,
    Indeterminate,
}

/// Classify a blob against the `RequirePasswordChange` definition.
///
/// Pure function of the inputs; no I/O. Absence of the selection is an
/// explicit "no", not "unknown". A selection carrying a value outside the
/// definition's permitted set is `Indeterminate` and is never acted on
/// destructively.
pub fn classify(
    blob: Option<&str>,
    definition: &AttributeDefinition,
) -> Result<Classification, PolicyError> {
    let selections = decode_selections(blob)?;

    let Some(selection) = selections
        .iter()
        .find(|selection| selection.definition_id == definition.id)
    else {
        return Ok(Classification::NotRequired);
    };

    let Some(value) = definition.value_by_id(selection.value_id) else {
        debug!(
            definition = %definition.name,
            value_id = %selection.value_id,
            "selection points at an unknown permitted value"
        );
        return Ok(Classification::Indeterminate);
    };

    if value.name.eq_ignore_ascii_case(VALUE_YES) {
        Ok(Classification::Required)
    } else if value.name.eq_ignore_ascii_case(VALUE_NO) {
        Ok(Classification::NotRequired)
    } else {
        Ok(Classification::Indeterminate)
    }
}

/// Classify an account's current blob.
///
/// When the `RequirePasswordChange` definition is not provisioned at all the
/// feature is disabled and every account classifies as `NotRequired`.
pub async fn classify_account(
    ctx: &PolicyContext,
    account_id: Uuid,
) -> Result<Classification, PolicyError> {
    let Some(definition) = ctx
        .definitions()
        .find_by_name(REQUIRE_PASSWORD_CHANGE)
        .await?
    else {
        return Ok(Classification::NotRequired);
    };

    let blob = ctx.store().get(account_id, ATTRIBUTES_KEY).await?;
    classify(blob.as_deref(), &definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::attributes::AttributeValue;
    use crate::policy::blob::Selection;

    fn definition() -> AttributeDefinition {
        AttributeDefinition {
            id: Uuid::new_v4(),
            name: REQUIRE_PASSWORD_CHANGE.to_string(),
            values: vec![
                AttributeValue {
                    id: Uuid::new_v4(),
                    name: VALUE_YES.to_string(),
                    display_order: i32::MIN,
                    is_pre_selected: true,
                },
                AttributeValue {
                    id: Uuid::new_v4(),
                    name: VALUE_NO.to_string(),
                    display_order: i32::MAX,
                    is_pre_selected: false,
                },
            ],
        }
    }

    fn blob_for(definition: &AttributeDefinition, value_name: &str) -> String {
        let value_id = definition
            .value_named(value_name)
            .map_or_else(Uuid::new_v4, |value| value.id);
        serde_json::to_string(&[Selection {
            definition_id: definition.id,
            value_id,
        }])
        .unwrap()
    }

    #[test]
    fn empty_blob_is_not_required() {
        let definition = definition();
        assert_eq!(
            classify(None, &definition).ok(),
            Some(Classification::NotRequired)
        );
        assert_eq!(
            classify(Some(""), &definition).ok(),
            Some(Classification::NotRequired)
        );
    }

    #[test]
    fn yes_selection_is_required() {
        let definition = definition();
        let blob = blob_for(&definition, VALUE_YES);
        assert_eq!(
            classify(Some(&blob), &definition).ok(),
            Some(Classification::Required)
        );
    }

    #[test]
    fn no_selection_is_not_required() {
        let definition = definition();
        let blob = blob_for(&definition, VALUE_NO);
        assert_eq!(
            classify(Some(&blob), &definition).ok(),
            Some(Classification::NotRequired)
        );
    }

    #[test]
    fn unknown_value_is_indeterminate() {
        let definition = definition();
        let blob = blob_for(&definition, "Maybe");
        assert_eq!(
            classify(Some(&blob), &definition).ok(),
            Some(Classification::Indeterminate)
        );
    }

    #[test]
    fn unrelated_selection_is_not_required() {
        let definition = definition();
        let blob = serde_json::to_string(&[Selection {
            definition_id: Uuid::new_v4(),
            value_id: Uuid::new_v4(),
        }])
        .unwrap();
        assert_eq!(
            classify(Some(&blob), &definition).ok(),
            Some(Classification::NotRequired)
        );
    }

    #[test]
    fn malformed_blob_is_an_error() {
        let definition = definition();
        assert!(matches!(
            classify(Some("not json"), &definition),
            Err(PolicyError::MalformedBlob(_))
        ));
    }
}
