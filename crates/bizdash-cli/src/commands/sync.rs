use anyhow::Result;
use bizdash_application::SyncScheduler;
use bizdash_core::SyncSession;
use std::time::Duration;

use super::context::App;

fn report(session: &SyncSession) {
    let summary = session.summary();
    if session.is_noop() {
        println!("✅ Up to date ({} slices)", summary.succeeded);
        return;
    }
    println!(
        "🔄 Sync finished: {} succeeded, {} failed, {} conflicts",
        summary.succeeded, summary.failed, summary.conflicts
    );
    for conflict in &session.conflicts {
        println!(
            "   ⚖️  {}/{}.{}: {:?}",
            conflict.slice_name, conflict.record_key, conflict.field, conflict.resolution
        );
    }
    for reason in &summary.failure_reasons {
        println!("   ❌ {}", reason);
    }
    if summary.auth_required {
        println!("   🔑 Credentials were rejected; update the token and run again");
    }
}

pub async fn once(app: &App) -> Result<()> {
    let session = app.engine()?.run_pass().await;
    report(&session);
    Ok(())
}

pub async fn watch(app: &App) -> Result<()> {
    let scheduler = SyncScheduler::new(
        app.engine()?,
        Duration::from_secs(app.config.sync.interval_secs),
    )
    .with_initial_pass(app.config.sync.auto_start);
    let mut latest = scheduler.subscribe();
    scheduler.start().await;
    println!("👀 Syncing every {}s, Ctrl-C to stop", app.config.sync.interval_secs);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = latest.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(session) = latest.borrow_and_update().clone() {
                    report(&session);
                }
            }
        }
    }

    scheduler.stop().await;
    Ok(())
}
