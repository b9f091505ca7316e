use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Free-form properties stored alongside a permanent media item
pub type CustomProperties = serde_json::Map<String, Value>;

/// Session and/or user that owns a staged upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerToken {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl OwnerToken {
    pub fn new(session_id: Option<String>, user_id: Option<String>) -> Self {
        Self {
            session_id: session_id.filter(|s| !s.is_empty()),
            user_id: user_id.filter(|u| !u.is_empty()),
        }
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self::new(Some(session_id.into()), None)
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(None, Some(user_id.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.user_id.is_none()
    }

    /// Whether `self`, presented by a caller, authorizes access to a record
    /// owned by `owner`.
    ///
    /// A user id on the record takes precedence: a caller presenting a
    /// different user id is rejected even when the session matches. A caller
    /// presenting no user id falls back to the session that created the
    /// upload.
    pub fn authorizes(&self, owner: &OwnerToken) -> bool {
        let session_matches = matches!(
            (&self.session_id, &owner.session_id),
            (Some(a), Some(b)) if a == b
        );

        match (&owner.user_id, &self.user_id) {
            (Some(record_user), Some(caller_user)) => record_user == caller_user,
            (Some(_), None) => session_matches,
            (None, _) => session_matches,
        }
    }
}

/// An upload as received from the host application.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(
        original_name: impl Into<String>,
        content_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            content_type: content_type.map(str::to_string),
            data: data.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempMediaUploadDto {
    pub id: String,
    /// Staging preview URL
    pub url: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub expires_at: DateTime<Utc>,
}

/// Request to move staged uploads onto a permanent record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TempMediaTransferDto {
    /// Caller order is preserved in the result and the collection sort key
    #[validate(length(
        min = 1,
        max = 100,
        message = "Between 1 and 100 temporary media ids are required"
    ))]
    pub temp_media_ids: Vec<String>,

    /// Per-id properties, merged over the call-wide ones
    #[serde(default)]
    pub custom_properties: HashMap<String, CustomProperties>,

    /// Owner presenting the request. `None` means the host already
    /// authorized it.
    #[serde(default)]
    pub owner: Option<OwnerToken>,
}

impl TempMediaTransferDto {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            temp_media_ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_owner(mut self, owner: OwnerToken) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_properties(mut self, temp_media_id: impl Into<String>, props: CustomProperties) -> Self {
        self.custom_properties.insert(temp_media_id.into(), props);
        self
    }
}

/// One staged upload that now lives in a permanent collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferredMedia {
    /// Permanent media id assigned by the library
    pub id: String,
    pub temp_media_id: String,
    pub url: String,
    pub original_name: String,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Missing, expired, already processed or claimed by a concurrent transfer
    NotFoundOrExpired,
    AttachFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    pub temp_media_id: String,
    #[serde(flatten)]
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTransferDto {
    pub collection_name: String,
    pub transferred_media: Vec<TransferredMedia>,
    pub transferred_count: usize,
    pub failures: Vec<TransferFailure>,
}

impl MediaTransferDto {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn transferred_temp_ids(&self) -> Vec<String> {
        self.transferred_media
            .iter()
            .map(|m| m.temp_media_id.clone())
            .collect()
    }
}

/// Identifies the entity a transfer targeted, for notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTargetRef {
    pub model_type: String,
    pub model_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    pub total_requests: u64,
    pub total_transferred: u64,
    pub total_failed: u64,
    pub total_cleaned_up: u64,
    pub by_collection: BTreeMap<String, u64>,
    pub active_temp_media: u64,
    pub processed_temp_media: u64,
}

/// Partition of requested ids into usable and unusable ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempMediaIdValidation {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(session: Option<&str>, user: Option<&str>) -> OwnerToken {
        OwnerToken::new(session.map(String::from), user.map(String::from))
    }

    #[test]
    fn test_session_only_record() {
        let record = owner(Some("s1"), None);
        assert!(owner(Some("s1"), None).authorizes(&record));
        assert!(!owner(Some("s2"), None).authorizes(&record));
        assert!(!owner(None, Some("u1")).authorizes(&record));
        assert!(owner(Some("s1"), Some("u9")).authorizes(&record));
    }

    #[test]
    fn test_user_id_takes_precedence() {
        let record = owner(Some("s1"), Some("u1"));
        assert!(owner(None, Some("u1")).authorizes(&record));
        assert!(owner(Some("other"), Some("u1")).authorizes(&record));
        assert!(!owner(Some("s1"), Some("u2")).authorizes(&record));
        // the session that created the upload is enough on its own
        assert!(owner(Some("s1"), None).authorizes(&record));
    }

    #[test]
    fn test_empty_caller_never_matches() {
        assert!(!OwnerToken::default().authorizes(&owner(Some("s1"), None)));
        assert!(!OwnerToken::default().authorizes(&owner(None, Some("u1"))));
        assert!(!OwnerToken::default().authorizes(&OwnerToken::default()));
    }

    #[test]
    fn test_blank_identifiers_are_dropped() {
        let token = OwnerToken::new(Some(String::new()), Some("u1".into()));
        assert_eq!(token.session_id, None);
        assert!(!token.is_empty());
    }

    #[test]
    fn test_transfer_dto_shape_validation() {
        assert!(TempMediaTransferDto::new(Vec::<String>::new()).validate().is_err());
        assert!(TempMediaTransferDto::new(["a"]).validate().is_ok());
        let too_many: Vec<String> = (0..101).map(|i| i.to_string()).collect();
        assert!(TempMediaTransferDto::new(too_many).validate().is_err());
    }

    #[test]
    fn test_failure_serialization() {
        let failure = TransferFailure {
            temp_media_id: "abc".into(),
            reason: FailureReason::NotFoundOrExpired,
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["reason"], "not_found_or_expired");
        assert_eq!(json["temp_media_id"], "abc");
    }
}
