//! SSH key commands

use console::style;

use super::Context;
use crate::display;
use crate::error::Result;

pub async fn add(ctx: &Context, name: &str, public_key: &str) -> Result<()> {
    let principal = ctx.principal().await?;
    let key = ctx
        .credentials()
        .add_ssh_key(&principal, name, public_key)
        .await?;

    if ctx.json {
        return display::print_json(&key);
    }
    println!(
        "{} Added SSH key {} (id {})",
        style("✓").green(),
        style(&key.name).cyan(),
        key.id
    );
    println!("  Fingerprint: {}", key.fingerprint);
    Ok(())
}

pub async fn list(ctx: &Context) -> Result<()> {
    let principal = ctx.principal().await?;
    let keys = ctx.credentials().list_ssh_keys(&principal).await?;

    if ctx.json {
        return display::print_json(&keys);
    }
    display::ssh_key_table(&keys);
    Ok(())
}

pub async fn delete(ctx: &Context, id: i64) -> Result<()> {
    let principal = ctx.principal().await?;
    ctx.credentials().delete_ssh_key(&principal, id).await?;

    if ctx.json {
        return display::print_json(&serde_json::json!({ "id": id, "deleted": true }));
    }
    println!("{} Deleted SSH key {}", style("✓").green(), id);
    Ok(())
}
