use anyhow::Result;
use bizdash_core::SnapshotStore;

use super::context::App;

pub fn list(app: &App) -> Result<()> {
    let current = app.store.snapshot_version();
    for version in app.persistence.audit_versions()? {
        let marker = if version == current { " (current)" } else { "" };
        match app.persistence.load_audit(version) {
            Ok(snapshot) => println!(
                "{:>8}  {}{}",
                version,
                snapshot
                    .saved_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                marker
            ),
            Err(e) => println!("{:>8}  unreadable: {}", version, e),
        }
    }
    Ok(())
}

pub async fn restore(app: &App, version: u64) -> Result<()> {
    let committed = app.store.restore_from_audit(version).await?;
    println!(
        "✅ Restored audit version {} as snapshot version {}",
        version, committed
    );
    Ok(())
}
