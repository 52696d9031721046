//! Admin activity trail. Write-only collaborator: privileged mutations record
//! who did what, and a failed insert never fails the request.

use sqlx::PgPool;
use tracing::{error, Instrument};
use uuid::Uuid;

pub async fn record(
    pool: &PgPool,
    admin_id: Uuid,
    action: &str,
    details: Option<String>,
    ip_address: Option<String>,
) {
    let query = r"
        INSERT INTO admin_activity_logs
            (admin_id, action, details, ip_address)
        VALUES ($1, $2, $3, $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    if let Err(err) = sqlx::query(query)
        .bind(admin_id)
        .bind(action)
        .bind(&details)
        .bind(&ip_address)
        .execute(pool)
        .instrument(span)
        .await
    {
        error!("Failed to record admin activity: {err}");
    }
}
