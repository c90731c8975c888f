//! List-ports command implementation.

use anyhow::Result;
use console::style;
use otaflash::{DetectedPort, detect_ports, select_port};

/// List available serial ports.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = detect_ports();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        eprintln!("{} No serial ports found", style("⚠").yellow());
        return Ok(());
    }

    let preferred = select_port(&ports)
        .ok()
        .map(|p| p.name);
    for line in format_ports(&ports, preferred.as_deref()) {
        println!("{line}");
    }

    Ok(())
}

/// One line per port, marking the one auto-detection would pick.
fn format_ports(ports: &[DetectedPort], preferred: Option<&str>) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let marker = if preferred == Some(port.name.as_str()) {
                "*"
            } else {
                " "
            };
            format!("{marker} {}", port.describe())
        })
        .collect()
}
