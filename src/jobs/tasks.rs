/// Background task implementations
use crate::{blob_store::BlobBackend, context::AppContext, error::InariResult, eventlog::ReplayReport};

/// Rebuild the projection from the full event log
pub async fn reconcile_projection(ctx: &AppContext) -> InariResult<ReplayReport> {
    ctx.event_log.replay().await
}

/// Health check - verify all systems are operational
pub async fn health_check(ctx: &AppContext) -> InariResult<()> {
    // Check database connectivity
    crate::db::test_connection(&ctx.db).await?;

    // Check the event log bucket can be listed
    ctx.blobs
        .list_keys(&ctx.config.events.bucket, &ctx.event_log.config().listing_prefix())
        .await?;

    // All checks passed
    Ok(())
}
