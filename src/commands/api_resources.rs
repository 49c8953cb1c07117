//! List the resource kinds the client can address

use anyhow::{Context, Result};
use std::path::Path;

use super::Session;
use crate::config::settings::Settings;
use crate::k8s::catalog::ApiResourceCatalog;

/// Handle the api-resources command
pub fn list(kubeconfig: Option<&Path>, refresh: bool, settings: &Settings) -> Result<()> {
    let catalog = if refresh {
        let session = Session::open(kubeconfig, settings, false)?;
        let count = session
            .api
            .catalog()
            .refresh(&session.api)
            .context("Failed to query the cluster's discovery endpoints")?;
        crate::log_info!("Discovered {} resource kinds", count);
        std::sync::Arc::clone(session.api.catalog())
    } else {
        std::sync::Arc::new(super::load_catalog(settings)?)
    };

    print!("{}", render_table(&catalog));
    Ok(())
}

/// Render the catalog in `kubectl api-resources -o wide` layout
pub fn render_table(catalog: &ApiResourceCatalog) -> String {
    let header = ["NAME", "SHORTNAMES", "APIVERSION", "NAMESPACED", "KIND", "VERBS"];
    let rows: Vec<[String; 6]> = catalog
        .descriptors()
        .iter()
        .map(|d| {
            [
                d.plural.clone(),
                d.short_names.join(","),
                d.group_version.clone(),
                d.namespaced.to_string(),
                d.kind.clone(),
                format!("[{}]", d.verbs.join(" ")),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let format_row = |cells: Vec<&str>| {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i + 1 == cells.len() {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{:<width$}  ", cell, width = widths[i]));
            }
        }
        line.push('\n');
        line
    };

    let mut out = format_row(header.to_vec());
    for row in &rows {
        out.push_str(&format_row(row.iter().map(String::as_str).collect()));
    }
    out
}
