//! Display formatting for CLI output
//!
//! Tables and detail views for containers and keys, plus JSON output.

use compute_core::{ApiKey, Container, ContainerStatus, IssuedApiKey, SshKey};
use console::{StyledObject, style};
use serde::Serialize;

use crate::error::{CliError, Result};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CliError::Io {
        message: e.to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

fn status_style(status: ContainerStatus) -> StyledObject<&'static str> {
    let s = status.as_str();
    match status {
        ContainerStatus::Running => style(s).green(),
        ContainerStatus::Failed => style(s).red(),
        ContainerStatus::Pending => style(s).yellow(),
        ContainerStatus::Stopped | ContainerStatus::Deleted => style(s).dim(),
    }
}

pub fn container_table(containers: &[Container]) {
    if containers.is_empty() {
        println!("No containers found");
        return;
    }

    println!(
        "{:<10} {:<20} {:<10} {:<16} {:<8} {:<8} {:<20}",
        style("ID").bold(),
        style("NAME").bold(),
        style("STATUS").bold(),
        style("ADDRESS").bold(),
        style("MEMORY").bold(),
        style("STORAGE").bold(),
        style("CREATED").bold()
    );

    for c in containers {
        println!(
            "{:<10} {:<20} {:<10} {:<16} {:<8} {:<8} {:<20}",
            c.id,
            c.name,
            status_style(c.status),
            c.external_ip.as_deref().unwrap_or("-"),
            format!("{}Mi", c.memory_mb),
            format!("{}Gi", c.storage_gb),
            c.created_at.format(TIME_FORMAT)
        );
    }
}

pub fn container_detail(c: &Container) {
    println!("{} {}", style("Container").bold(), style(&c.id).cyan());
    println!("  Name:      {}", c.name);
    println!("  Status:    {}", status_style(c.status));
    println!("  Namespace: {}", c.namespace);
    println!("  Image:     {}", c.image);
    println!("  Memory:    {}Mi", c.memory_mb);
    println!("  Storage:   {}Gi", c.storage_gb);
    println!("  Created:   {}", c.created_at.format(TIME_FORMAT));
    if let Some(stopped) = c.stopped_at {
        println!("  Stopped:   {}", stopped.format(TIME_FORMAT));
    }
    match c.ssh_command() {
        Some(cmd) => println!("  SSH:       {}", style(cmd).green()),
        None => println!("  SSH:       {}", style("waiting for external address").dim()),
    }
}

pub fn ssh_key_table(keys: &[SshKey]) {
    if keys.is_empty() {
        println!("No SSH keys found");
        return;
    }

    println!(
        "{:<6} {:<20} {:<50} {:<20}",
        style("ID").bold(),
        style("NAME").bold(),
        style("FINGERPRINT").bold(),
        style("CREATED").bold()
    );
    for k in keys {
        println!(
            "{:<6} {:<20} {:<50} {:<20}",
            k.id,
            k.name,
            k.fingerprint,
            k.created_at.format(TIME_FORMAT)
        );
    }
}

pub fn api_key_table(keys: &[ApiKey]) {
    if keys.is_empty() {
        println!("No API keys found");
        return;
    }

    println!(
        "{:<6} {:<20} {:<20} {:<20}",
        style("ID").bold(),
        style("NAME").bold(),
        style("CREATED").bold(),
        style("LAST USED").bold()
    );
    for k in keys {
        let last_used = k
            .last_used
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<6} {:<20} {:<20} {:<20}",
            k.id,
            k.name,
            k.created_at.format(TIME_FORMAT),
            last_used
        );
    }
}

pub fn issued_api_key(issued: &IssuedApiKey) {
    println!(
        "{} Created API key {} (id {})",
        style("✓").green(),
        style(&issued.key.name).cyan(),
        issued.key.id
    );
    println!();
    println!("  {}", style(&issued.secret).bold());
    println!();
    println!(
        "{} This key is shown only once. Store it somewhere safe.",
        style("⚠").yellow()
    );
}
