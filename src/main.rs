/// Inari - event-sourced publishing backend
///
/// Rebuilds the projection from the event log at start-up, then keeps it
/// reconciled in the background until interrupted.

use futures::future::join_all;
use inari::{config::ServerConfig, context::AppContext, error::InariResult, jobs, logging};
use std::sync::Arc;

#[tokio::main]
async fn main() -> InariResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    logging::init(&config.logging);

    // Print banner
    print_banner();

    // Create application context
    let replay_on_start = config.replay.on_start;
    let ctx = Arc::new(AppContext::new(config).await?);

    if replay_on_start {
        let report = ctx.event_log.replay().await?;
        tracing::info!(
            "Projection rebuilt: {} applied, {} duplicates, {} skipped",
            report.applied,
            report.duplicates,
            report.skipped
        );
    }

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    let handles = scheduler.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    for handle in &handles {
        handle.abort();
    }
    join_all(handles).await;
    ctx.db.close().await;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ____               _
   /  _/___  ____ ______(_)
   / // __ \/ __ `/ ___/ /
 _/ // / / / /_/ / /  / /
/___/_/ /_/\__,_/_/  /_/

        Event-sourced publishing backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
