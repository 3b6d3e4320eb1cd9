//! `tether hosts` - show configured host profiles.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tether_remote::{RemoteConfig, ResolvedHost};

use crate::cli::CommandContext;
use crate::utils::{EXIT_OK, format_timeout, print_json, safe_write_stdout};

/// List host profiles from the configuration file.
#[derive(Debug, Parser)]
pub struct HostsCommand {
    /// Show how one name resolves (profile or ad-hoc [user@]host[:port])
    pub name: Option<String>,
}

/// One line of the listing.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HostRow {
    pub name: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    pub timeout_secs: u64,
    pub utf8: bool,
}

impl HostRow {
    fn new(name: &str, resolved: &ResolvedHost) -> Self {
        Self {
            name: name.to_string(),
            destination: resolved.target.destination(),
            port: resolved.target.port,
            identity_file: resolved
                .target
                .identity_file
                .as_ref()
                .map(|p| p.display().to_string()),
            timeout_secs: resolved.timeout.as_secs(),
            utf8: resolved.utf8,
        }
    }
}

impl HostsCommand {
    pub fn rows(&self, config: &RemoteConfig) -> Result<Vec<HostRow>> {
        match &self.name {
            Some(name) => {
                let resolved = config
                    .resolve_target(name)
                    .with_context(|| format!("Unknown host '{name}'"))?;
                Ok(vec![HostRow::new(name, &resolved)])
            }
            None => config
                .hosts
                .keys()
                .map(|name| {
                    let resolved = config
                        .resolve_target(name)
                        .with_context(|| format!("Invalid host profile '{name}'"))?;
                    Ok(HostRow::new(name, &resolved))
                })
                .collect(),
        }
    }

    pub fn run(self, ctx: &CommandContext) -> Result<i32> {
        let config = ctx.load_config()?;
        let rows = self.rows(&config)?;

        if ctx.json {
            print_json(&rows)?;
            return Ok(EXIT_OK);
        }

        if rows.is_empty() {
            safe_write_stdout(b"No host profiles configured\n").context("failed to write listing")?;
            return Ok(EXIT_OK);
        }

        let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
        let mut out = String::new();
        for row in &rows {
            let port = row.port.map(|p| format!(":{p}")).unwrap_or_default();
            let timeout = format_timeout(std::time::Duration::from_secs(row.timeout_secs));
            out.push_str(&format!(
                "{:<width$}  {}{}  timeout {}{}\n",
                row.name,
                row.destination,
                port,
                timeout,
                if row.utf8 { "  utf8" } else { "" },
            ));
        }
        safe_write_stdout(out.as_bytes()).context("failed to write listing")?;
        Ok(EXIT_OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rows_are_sorted_by_name() {
        let config = RemoteConfig::from_toml_str(
            r#"
[hosts.zeta]
host = "z.example.com"

[hosts.alpha]
host = "a.example.com"
user = "ops"
port = 2200
"#,
        )
        .unwrap();

        let rows = HostsCommand { name: None }.rows(&config).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(rows[0].destination, "ops@a.example.com");
        assert_eq!(rows[0].port, Some(2200));
        assert_eq!(rows[1].timeout_secs, 30);
    }

    #[test]
    fn test_single_ad_hoc_name() {
        let rows = HostsCommand {
            name: Some("root@db:2222".to_string()),
        }
        .rows(&RemoteConfig::default())
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].destination, "root@db");
        assert_eq!(rows[0].port, Some(2222));
    }
}
