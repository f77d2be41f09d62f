//! Point-in-time view of a course batch as handed over by the persistence layer.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::UserId;

/// Key of the course name inside `courseAdditionalInfo`.
const INFO_COURSE_NAME: &str = "courseName";

/// Key of the course logo URL inside `courseAdditionalInfo`.
const INFO_COURSE_LOGO_URL: &str = "courseLogoUrl";

/// A snapshot of one course batch.
///
/// Snapshots are read-only inputs to the notification pipeline: the differ
/// and the fan-out routine only ever borrow them. `mentors` and
/// `participant` are optional because upstream records omit them when the
/// roster was never set; absent rosters behave like empty ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    #[serde(default, alias = "id")]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub org_name: Option<String>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub course_logo_url: Option<String>,
    /// Free-form course metadata; older records keep the course name and
    /// logo here instead of at the top level. Upstream sends `null` or
    /// non-string values here, so it is kept as raw JSON.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub course_additional_info: BTreeMap<String, Value>,
    /// Mentor ids in the order they were assigned.
    #[serde(default)]
    pub mentors: Option<Vec<UserId>>,
    /// Participant id to "is active" flag. A `null` flag reads as inactive.
    #[serde(default, deserialize_with = "participant_flags")]
    pub participant: Option<BTreeMap<UserId, bool>>,
}

impl BatchSnapshot {
    /// Mentor ids, empty when the roster is absent.
    pub fn mentor_ids(&self) -> &[UserId] {
        self.mentors.as_deref().unwrap_or(&[])
    }

    /// Ids of participants currently flagged active.
    pub fn active_participants(&self) -> Vec<UserId> {
        self.participant
            .iter()
            .flatten()
            .filter(|(_, active)| **active)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn course_name(&self) -> Option<&str> {
        self.course_name
            .as_deref()
            .or_else(|| self.additional_info_str(INFO_COURSE_NAME))
    }

    pub fn course_logo_url(&self) -> Option<&str> {
        self.course_logo_url
            .as_deref()
            .or_else(|| self.additional_info_str(INFO_COURSE_LOGO_URL))
    }

    /// String entry of `courseAdditionalInfo`; other JSON types are ignored.
    fn additional_info_str(&self, key: &str) -> Option<&str> {
        self.course_additional_info.get(key).and_then(Value::as_str)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

fn participant_flags<'de, D>(deserializer: D) -> Result<Option<BTreeMap<UserId, bool>>, D::Error>
where
    D: Deserializer<'de>,
{
    let flags: Option<BTreeMap<UserId, Option<bool>>> = Option::deserialize(deserializer)?;
    Ok(flags.map(|flags| {
        flags
            .into_iter()
            .map(|(id, active)| (id, active.unwrap_or(false)))
            .collect()
    }))
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// The users a single fan-out should reach, split by role.
///
/// Ids are de-duplicated within each role so nobody receives the same
/// notification twice for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub mentors: Vec<UserId>,
    pub participants: Vec<UserId>,
}

impl Roster {
    pub fn new(
        mentors: impl IntoIterator<Item = UserId>,
        participants: impl IntoIterator<Item = UserId>,
    ) -> Self {
        Self {
            mentors: dedup_preserving_order(mentors),
            participants: dedup_preserving_order(participants),
        }
    }

    /// Everyone currently on the batch: all mentors and active participants.
    pub fn from_batch(batch: &BatchSnapshot) -> Self {
        Self::new(batch.mentor_ids().iter().cloned(), batch.active_participants())
    }

    pub fn is_empty(&self) -> bool {
        self.mentors.is_empty() && self.participants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mentors.len() + self.participants.len()
    }
}

fn dedup_preserving_order(ids: impl IntoIterator<Item = UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_upstream_record_with_missing_rosters() {
        let batch: BatchSnapshot = serde_json::from_value(serde_json::json!({
            "id": "b-1",
            "name": "Evening cohort",
            "courseId": "c-9",
            "startDate": "2026-01-05",
            "courseAdditionalInfo": { "courseName": "Rust 101", "courseLogoUrl": "https://x/logo.png" }
        }))
        .expect("valid snapshot");

        assert_eq!(batch.batch_id.as_deref(), Some("b-1"));
        assert!(batch.mentor_ids().is_empty());
        assert!(batch.active_participants().is_empty());
        assert_eq!(batch.course_name(), Some("Rust 101"));
        assert_eq!(batch.course_logo_url(), Some("https://x/logo.png"));
    }

    #[test]
    fn top_level_course_fields_take_precedence() {
        let mut batch = BatchSnapshot {
            course_name: Some("Top".into()),
            ..Default::default()
        };
        batch
            .course_additional_info
            .insert(INFO_COURSE_NAME.into(), "Nested".into());
        assert_eq!(batch.course_name(), Some("Top"));
    }

    #[test]
    fn active_participants_skip_inactive_entries() {
        let batch = BatchSnapshot {
            participant: Some(BTreeMap::from([
                ("u1".to_string(), true),
                ("u2".to_string(), false),
                ("u3".to_string(), true),
            ])),
            ..Default::default()
        };
        assert_eq!(batch.active_participants(), vec!["u1", "u3"]);
    }

    #[test]
    fn tolerates_null_info_and_null_participant_flags() {
        let batch: BatchSnapshot = serde_json::from_value(serde_json::json!({
            "name": "Cohort",
            "courseAdditionalInfo": null,
            "mentors": ["a"],
            "participant": { "u1": null, "u2": true }
        }))
        .expect("valid snapshot");

        assert!(batch.course_additional_info.is_empty());
        assert_eq!(batch.course_name(), None);
        assert_eq!(batch.mentor_ids(), &["a".to_string()]);
        assert_eq!(batch.active_participants(), vec!["u2"]);
    }

    #[test]
    fn non_string_info_values_are_ignored() {
        let batch: BatchSnapshot = serde_json::from_value(serde_json::json!({
            "courseAdditionalInfo": { "courseName": "Rust", "leafNodesCount": 5, "courseLogoUrl": 7 }
        }))
        .expect("valid snapshot");

        assert_eq!(batch.course_name(), Some("Rust"));
        assert_eq!(batch.course_logo_url(), None);
    }

    #[test]
    fn roster_drops_duplicate_mentors() {
        let batch = BatchSnapshot {
            mentors: Some(vec!["a".into(), "b".into(), "a".into()]),
            ..Default::default()
        };
        let roster = Roster::from_batch(&batch);
        assert_eq!(roster.mentors, vec!["a", "b"]);
        assert_eq!(roster.len(), 2);
    }
}
