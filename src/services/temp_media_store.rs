use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::entities::prelude::*;
use crate::entities::temp_media::{self, TempMediaStatus};
use crate::models::OwnerToken;
use crate::utils::validation::ValidatedUpload;

/// Row access for staged uploads.
///
/// Every status change is a single conditional statement on the row's
/// current status, so two concurrent writers can never both succeed.
#[derive(Clone)]
pub struct TempMediaStore {
    db: DatabaseConnection,
}

/// Rows without a claim, or whose claim is older than `stale_before`
fn unclaimed(stale_before: DateTime<Utc>) -> Condition {
    Condition::any()
        .add(temp_media::Column::ClaimToken.is_null())
        .add(temp_media::Column::ClaimedAt.lt(stale_before))
}

impl TempMediaStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn insert(&self, row: temp_media::ActiveModel) -> Result<temp_media::Model, DbErr> {
        row.insert(&self.db).await
    }

    pub async fn find(&self, id: &str) -> Result<Option<temp_media::Model>, DbErr> {
        TempMedia::find_by_id(id.to_string()).one(&self.db).await
    }

    /// Active and unexpired at `now`
    pub async fn find_active(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<temp_media::Model>, DbErr> {
        TempMedia::find_by_id(id.to_string())
            .filter(temp_media::Column::Status.eq(TempMediaStatus::Active))
            .filter(temp_media::Column::ExpiresAt.gt(now))
            .one(&self.db)
            .await
    }

    pub async fn find_active_many(
        &self,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<temp_media::Model>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        TempMedia::find()
            .filter(temp_media::Column::Id.is_in(ids.iter().cloned()))
            .filter(temp_media::Column::Status.eq(TempMediaStatus::Active))
            .filter(temp_media::Column::ExpiresAt.gt(now))
            .all(&self.db)
            .await
    }

    /// Claim an active row for a transfer. Returns false when the row is
    /// gone, no longer active, expired, or holds any claim.
    ///
    /// A claim that was never released may belong to a transfer that already
    /// attached the file, so it is never taken over. Such rows stay with the
    /// sweeper and `delete_unclaimed` once the claim is stale.
    pub async fn claim(
        &self,
        id: &str,
        claim_token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let res = TempMedia::update_many()
            .col_expr(temp_media::Column::ClaimToken, Expr::value(claim_token.to_string()))
            .col_expr(temp_media::Column::ClaimedAt, Expr::value(now))
            .filter(temp_media::Column::Id.eq(id))
            .filter(temp_media::Column::Status.eq(TempMediaStatus::Active))
            .filter(temp_media::Column::ExpiresAt.gt(now))
            .filter(temp_media::Column::ClaimToken.is_null())
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Drop a claim, only if it is still ours
    pub async fn release_claim(&self, id: &str, claim_token: &str) -> Result<bool, DbErr> {
        let res = TempMedia::update_many()
            .col_expr(temp_media::Column::ClaimToken, Expr::value(Option::<String>::None))
            .col_expr(
                temp_media::Column::ClaimedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(temp_media::Column::Id.eq(id))
            .filter(temp_media::Column::ClaimToken.eq(claim_token))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Active → Processed for the given ids; returns rows changed
    pub async fn mark_processed(&self, ids: &[String], now: DateTime<Utc>) -> Result<u64, DbErr> {
        if ids.is_empty() {
            return Ok(0);
        }
        let res = TempMedia::update_many()
            .col_expr(temp_media::Column::Status, Expr::value(TempMediaStatus::Processed))
            .col_expr(temp_media::Column::ProcessedAt, Expr::value(Some(now)))
            .col_expr(temp_media::Column::ClaimToken, Expr::value(Option::<String>::None))
            .col_expr(
                temp_media::Column::ClaimedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(temp_media::Column::Id.is_in(ids.iter().cloned()))
            .filter(temp_media::Column::Status.eq(TempMediaStatus::Active))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Active → Expired for a row past its expiry that nobody is transferring
    pub async fn mark_expired(
        &self,
        id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let res = TempMedia::update_many()
            .col_expr(temp_media::Column::Status, Expr::value(TempMediaStatus::Expired))
            .filter(temp_media::Column::Id.eq(id))
            .filter(temp_media::Column::Status.eq(TempMediaStatus::Active))
            .filter(temp_media::Column::ExpiresAt.lte(now))
            .filter(unclaimed(stale_before))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Delete a row only while it still has `status`
    pub async fn delete_with_status(&self, id: &str, status: TempMediaStatus) -> Result<bool, DbErr> {
        let res = TempMedia::delete_many()
            .filter(temp_media::Column::Id.eq(id))
            .filter(temp_media::Column::Status.eq(status))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Delete a row in any status unless a live transfer claim holds it
    pub async fn delete_unclaimed(&self, id: &str, stale_before: DateTime<Utc>) -> Result<bool, DbErr> {
        let res = TempMedia::delete_many()
            .filter(temp_media::Column::Id.eq(id))
            .filter(unclaimed(stale_before))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Expired rows, plus active rows past `now`, skipping live claims
    pub async fn find_expired(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<temp_media::Model>, DbErr> {
        TempMedia::find()
            .filter(
                Condition::any()
                    .add(temp_media::Column::Status.eq(TempMediaStatus::Expired))
                    .add(
                        Condition::all()
                            .add(temp_media::Column::Status.eq(TempMediaStatus::Active))
                            .add(temp_media::Column::ExpiresAt.lte(now)),
                    ),
            )
            .filter(unclaimed(stale_before))
            .order_by_asc(temp_media::Column::ExpiresAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    /// Processed rows whose `processed_at` is at or before `cutoff`
    pub async fn find_processed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<temp_media::Model>, DbErr> {
        TempMedia::find()
            .filter(temp_media::Column::Status.eq(TempMediaStatus::Processed))
            .filter(temp_media::Column::ProcessedAt.lte(cutoff))
            .order_by_asc(temp_media::Column::ProcessedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    pub async fn count_with_status(&self, status: TempMediaStatus) -> Result<u64, DbErr> {
        TempMedia::find()
            .filter(temp_media::Column::Status.eq(status))
            .count(&self.db)
            .await
    }

    pub fn new_row(
        id: String,
        file_path: String,
        upload: &ValidatedUpload,
        checksum: String,
        owner: &OwnerToken,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> temp_media::ActiveModel {
        temp_media::ActiveModel {
            id: Set(id),
            file_path: Set(file_path),
            original_name: Set(upload.original_name.clone()),
            mime_type: Set(upload.mime_type.clone()),
            size_bytes: Set(upload.size as i64),
            checksum: Set(checksum),
            session_id: Set(owner.session_id.clone()),
            user_id: Set(owner.user_id.clone()),
            status: Set(TempMediaStatus::Active),
            created_at: Set(created_at),
            expires_at: Set(expires_at),
            processed_at: Set(None),
            claim_token: Set(None),
            claimed_at: Set(None),
        }
    }
}
