use anyhow::Result;

use super::context::App;

pub fn run(app: &App, slice: Option<&str>) -> Result<()> {
    match slice {
        Some(name) => {
            let slice = app.store.get_slice(name)?;
            println!("{}", serde_json::to_string_pretty(slice.as_ref())?);
        }
        None => {
            let snapshot = app.store.snapshot();
            println!("snapshot version {}", snapshot.snapshot_version);
            for (name, slice) in &snapshot.slices {
                let status = match (&slice.last_sync, slice.needs_resync) {
                    (_, true) => "needs resync".to_string(),
                    (Some(last), false) => format!("{:?} at {}", last.outcome, last.at),
                    (None, false) => "never synced".to_string(),
                };
                println!(
                    "  {:<16} {:>5} rows  {}  {}",
                    name,
                    slice.rows.len(),
                    if slice.dirty { "dirty" } else { "clean" },
                    status
                );
            }
        }
    }
    Ok(())
}
