use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::OwnerToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TempMediaStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "processed")]
    Processed,
    #[sea_orm(string_value = "expired")]
    Expired,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "temp_media")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub file_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub status: TempMediaStatus,
    pub created_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
    /// Set while a transfer is attaching this upload
    pub claim_token: Option<String>,
    pub claimed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn owner(&self) -> OwnerToken {
        OwnerToken::new(self.session_id.clone(), self.user_id.clone())
    }

    /// Active and not yet past its expiry
    pub fn is_usable_at(&self, now: DateTimeUtc) -> bool {
        self.status == TempMediaStatus::Active && self.expires_at > now
    }
}
