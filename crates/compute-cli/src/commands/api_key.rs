//! API key commands

use console::style;

use super::Context;
use crate::display;
use crate::error::Result;

pub async fn create(ctx: &Context, name: &str) -> Result<()> {
    let principal = ctx.principal().await?;
    let issued = ctx.credentials().create_api_key(&principal, name).await?;

    if ctx.json {
        return display::print_json(&issued);
    }
    display::issued_api_key(&issued);
    Ok(())
}

pub async fn list(ctx: &Context) -> Result<()> {
    let principal = ctx.principal().await?;
    let keys = ctx.credentials().list_api_keys(&principal).await?;

    if ctx.json {
        return display::print_json(&keys);
    }
    display::api_key_table(&keys);
    Ok(())
}

pub async fn delete(ctx: &Context, id: i64) -> Result<()> {
    let principal = ctx.principal().await?;
    ctx.credentials().delete_api_key(&principal, id).await?;

    if ctx.json {
        return display::print_json(&serde_json::json!({ "id": id, "deleted": true }));
    }
    println!("{} Deleted API key {}", style("✓").green(), id);
    Ok(())
}
