use anyhow::{Context, Result};
use bizdash_core::{EditCommand, FieldValue, Fields};

use super::context::App;

/// Parses `FIELD=VALUE` pairs; values that are not valid JSON are taken as strings.
fn parse_pairs(pairs: &[String]) -> Result<Fields> {
    pairs
        .iter()
        .map(|pair| {
            let (field, raw) = pair
                .split_once('=')
                .with_context(|| format!("Expected FIELD=VALUE, got '{}'", pair))?;
            let value = serde_json::from_str::<FieldValue>(raw)
                .unwrap_or_else(|_| FieldValue::String(raw.to_string()));
            Ok((field.to_string(), value))
        })
        .collect()
}

pub async fn edit(app: &App, slice: &str, key: &str, patches: &[String]) -> Result<()> {
    let mut cmd = EditCommand::new(slice, key, app.clock.now());
    cmd.field_patches = parse_pairs(patches)?;
    let updated = app.store.apply_edit_command(cmd).await?;
    println!(
        "✅ Updated {}/{} (snapshot version {})",
        updated.name,
        key,
        app.store.snapshot_version()
    );
    Ok(())
}

pub async fn insert(app: &App, slice: &str, key: &str, fields: &[String]) -> Result<()> {
    app.store.insert_record(slice, key, parse_pairs(fields)?).await?;
    println!("✅ Created {}/{}", slice, key);
    Ok(())
}

pub async fn delete(app: &App, slice: &str, key: &str) -> Result<()> {
    app.store.delete_record(slice, key).await?;
    println!("🗑️  Deleted {}/{}", slice, key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pairs() {
        let fields = parse_pairs(&[
            "amount=500".to_string(),
            "category=travel".to_string(),
            "meta={\"approved\":true}".to_string(),
        ])
        .unwrap();

        assert_eq!(fields["amount"], json!(500));
        assert_eq!(fields["category"], json!("travel"));
        assert_eq!(fields["meta"], json!({"approved": true}));
    }

    #[test]
    fn test_parse_pairs_rejects_missing_equals() {
        assert!(parse_pairs(&["amount".to_string()]).is_err());
    }
}
