//! Container commands - create, inspect, stop, start and delete containers

use compute_core::NewContainer;
use compute_kube::KubeGateway;
use compute_lifecycle::ComputeService;
use compute_store::{ContainerStore, SqliteStore};
use console::style;
use std::sync::Arc;

use super::Context;
use crate::display;
use crate::error::Result;

async fn service(ctx: &Context) -> Result<ComputeService<KubeGateway, SqliteStore>> {
    let gateway = KubeGateway::new(ctx.config.cluster.clone()).await?;
    Ok(ComputeService::new(
        Arc::new(gateway),
        ctx.store.clone(),
        &ctx.config,
    ))
}

/// Create a container, then wait for provisioning and address discovery
pub async fn create(
    ctx: &Context,
    name: &str,
    memory: Option<u32>,
    storage: Option<u32>,
    ssh_keys: Vec<i64>,
) -> Result<()> {
    let principal = ctx.principal().await?;
    let service = service(ctx).await?;

    let mut request = NewContainer::new(name, ssh_keys);
    request.memory_mb = memory;
    request.storage_gb = storage;

    let container = service.create_container(&principal, request).await?;
    if !ctx.json {
        println!(
            "{} Created container {} ({})",
            style("✓").green(),
            style(&container.name).cyan(),
            container.id
        );
        println!(
            "{} Provisioning namespace {}, waiting for an external address...",
            style("→").blue(),
            container.namespace
        );
    }

    service.supervisor().wait_idle().await;
    let container = service.get_container(&principal, &container.id).await?;

    if ctx.json {
        return display::print_json(&container);
    }
    println!();
    display::container_detail(&container);
    Ok(())
}

/// Records only; listing never contacts the cluster
pub async fn list(ctx: &Context) -> Result<()> {
    let principal = ctx.principal().await?;
    let containers = ctx.store.list_by_user(principal.user_id).await?;

    if ctx.json {
        return display::print_json(&containers);
    }
    display::container_table(&containers);
    Ok(())
}

pub async fn get(ctx: &Context, id: &str) -> Result<()> {
    let principal = ctx.principal().await?;
    let container = service(ctx).await?.get_container(&principal, id).await?;

    if ctx.json {
        return display::print_json(&container);
    }
    display::container_detail(&container);
    Ok(())
}

pub async fn stop(ctx: &Context, id: &str) -> Result<()> {
    let principal = ctx.principal().await?;
    let container = service(ctx).await?.stop_container(&principal, id).await?;

    if ctx.json {
        return display::print_json(&container);
    }
    println!("{} Stopped container {}", style("✓").green(), container.id);
    Ok(())
}

pub async fn start(ctx: &Context, id: &str) -> Result<()> {
    let principal = ctx.principal().await?;
    let container = service(ctx).await?.start_container(&principal, id).await?;

    if ctx.json {
        return display::print_json(&container);
    }
    println!("{} Started container {}", style("✓").green(), container.id);
    Ok(())
}

pub async fn delete(ctx: &Context, id: &str) -> Result<()> {
    let principal = ctx.principal().await?;
    service(ctx).await?.delete_container(&principal, id).await?;

    if ctx.json {
        return display::print_json(&serde_json::json!({ "id": id, "deleted": true }));
    }
    println!("{} Deleted container {}", style("✓").green(), id);
    Ok(())
}
