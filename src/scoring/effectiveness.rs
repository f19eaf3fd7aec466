// Topic effectiveness: claims against counter-arguments.
//
// Effective when claims outnumber counterclaims + rebuttals, Adequate when the
// two are equal, Ineffective otherwise. Evidence counts toward neither side.
//
// Unlike the classification stages this is a hard contract: a record without
// a recognizable role is an error, never silently skipped.

use serde_json::Value;

use crate::error::ScoreError;
use crate::models::{ClassifiedComment, Effectiveness, Role};

/// Anything that carries an argumentative role.
pub trait RoleTagged {
    /// The record's role. Err for a missing or unrecognized role; `index` is
    /// the record's position, for the error message.
    fn role_at(&self, index: usize) -> Result<Role, ScoreError>;
}

impl RoleTagged for ClassifiedComment {
    fn role_at(&self, _index: usize) -> Result<Role, ScoreError> {
        Ok(self.role)
    }
}

impl RoleTagged for Role {
    fn role_at(&self, _index: usize) -> Result<Role, ScoreError> {
        Ok(*self)
    }
}

/// Loosely-typed records as they arrive over the wire or from a file. The
/// role lives under `type` (or `role`).
impl RoleTagged for Value {
    fn role_at(&self, index: usize) -> Result<Role, ScoreError> {
        let field = self
            .as_object()
            .and_then(|obj| obj.get("type").or_else(|| obj.get("role")))
            .ok_or(ScoreError::MissingRole { index })?;

        let label = field.as_str().ok_or_else(|| ScoreError::UnknownRole {
            index,
            value: field.to_string(),
        })?;

        Role::from_label(label).ok_or_else(|| ScoreError::UnknownRole {
            index,
            value: label.to_string(),
        })
    }
}

impl<T: RoleTagged + ?Sized> RoleTagged for &T {
    fn role_at(&self, index: usize) -> Result<Role, ScoreError> {
        (**self).role_at(index)
    }
}

/// Score a group of role-tagged records. Order does not matter.
pub fn score<T: RoleTagged>(records: &[T]) -> Result<Effectiveness, ScoreError> {
    let mut claims = 0;
    let mut counters = 0;

    for (index, record) in records.iter().enumerate() {
        match record.role_at(index)? {
            Role::Claim => claims += 1,
            role if role.is_counter() => counters += 1,
            _ => {}
        }
    }

    Ok(Effectiveness::from_counts(claims, counters))
}

/// Score a JSON document that should be an array of role-tagged objects.
pub fn score_json(value: &Value) -> Result<Effectiveness, ScoreError> {
    let records = value.as_array().ok_or(ScoreError::NotASequence)?;
    score(records.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_is_adequate() {
        let empty: Vec<Role> = Vec::new();
        assert_eq!(score(&empty), Ok(Effectiveness::Adequate));
    }

    #[test]
    fn test_claims_win() {
        let roles = [Role::Claim, Role::Claim, Role::Rebuttal];
        assert_eq!(score(&roles), Ok(Effectiveness::Effective));
    }

    #[test]
    fn test_counterclaims_and_rebuttals_add_up() {
        let roles = [Role::Claim, Role::Counterclaim, Role::Rebuttal];
        assert_eq!(score(&roles), Ok(Effectiveness::Ineffective));
    }

    #[test]
    fn test_evidence_is_neutral() {
        let roles = [Role::Claim, Role::Counterclaim, Role::Evidence, Role::Evidence];
        assert_eq!(score(&roles), Ok(Effectiveness::Adequate));
    }

    #[test]
    fn test_json_records() {
        let records = json!([
            {"text": "a", "topic": "t", "type": "Claim"},
            {"text": "b", "topic": "t", "type": "Evidence"},
        ]);
        assert_eq!(score_json(&records), Ok(Effectiveness::Effective));
    }

    #[test]
    fn test_json_missing_type_is_an_error() {
        let records = json!([{"type": "Claim"}, {"text": "no role here"}]);
        assert_eq!(score_json(&records), Err(ScoreError::MissingRole { index: 1 }));
    }

    #[test]
    fn test_json_non_object_is_an_error() {
        let records = json!(["Claim"]);
        assert_eq!(score_json(&records), Err(ScoreError::MissingRole { index: 0 }));
    }

    #[test]
    fn test_json_unknown_role_is_an_error() {
        let records = json!([{"type": "Opinion"}]);
        assert!(matches!(
            score_json(&records),
            Err(ScoreError::UnknownRole { index: 0, .. })
        ));
    }

    #[test]
    fn test_json_not_a_sequence() {
        assert_eq!(score_json(&json!({"type": "Claim"})), Err(ScoreError::NotASequence));
    }

    #[test]
    fn test_role_field_alias() {
        let records = json!([{"role": "Rebuttal"}]);
        assert_eq!(score_json(&records), Ok(Effectiveness::Ineffective));
    }
}
