//! `sources` and `overrides` commands: show what a run would talk to.

use anyhow::Result;

use crate::config::{Config, Credentials};
use crate::resolve::OverrideTable;

/// One row of the `sources` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub name: &'static str,
    pub endpoint: String,
    pub status: String,
}

pub fn source_statuses(config: &Config, credentials: &Credentials) -> Vec<SourceStatus> {
    let token_status = |token: &Option<String>, var: &str, required: bool| match (token, required) {
        (Some(_), _) => format!("OK (token from {})", var),
        (None, true) => format!("SKIPPED (set {})", var),
        (None, false) => format!("OK (anonymous, {} unset)", var),
    };

    let taps = if config.homebrew.taps.is_empty() {
        String::new()
    } else {
        format!(" + {} taps", config.homebrew.taps.len())
    };

    vec![
        SourceStatus {
            name: "manifests",
            endpoint: format!(
                "{}/{}/{}",
                config.manifests.raw_base, config.manifests.owner, config.manifests.repo
            ),
            status: format!(
                "{} Flatpak, {} Homebrew files",
                config.manifests.flatpak.len(),
                config.manifests.homebrew.len()
            ),
        },
        SourceStatus {
            name: "flathub",
            endpoint: config.flathub.api_base.clone(),
            status: format!("OK (recent cap {})", config.flathub.recent_cap),
        },
        SourceStatus {
            name: "homebrew",
            endpoint: config.homebrew.api_base.clone(),
            status: format!("OK{}", taps),
        },
        SourceStatus {
            name: "os-releases",
            endpoint: format!("github.com/{}/{}", config.os.owner, config.os.repo),
            status: format!("OK (last {})", config.os.per_page),
        },
        SourceStatus {
            name: "github",
            endpoint: config.github.api_base.clone(),
            status: token_status(&credentials.github, &config.github.token_env, true),
        },
        SourceStatus {
            name: "gitlab",
            endpoint: config
                .gitlab
                .api_base
                .clone()
                .unwrap_or_else(|| "<repository host>".to_string()),
            status: token_status(&credentials.gitlab, &config.gitlab.token_env, false),
        },
    ]
}

pub fn list_sources(config: &Config) -> Result<()> {
    let credentials = Credentials::from_env(config);

    println!("{:<12} {:<44} STATUS", "SOURCE", "ENDPOINT");
    for row in source_statuses(config, &credentials) {
        println!("{:<12} {:<44} {}", row.name, row.endpoint, row.status);
    }
    Ok(())
}

pub fn list_overrides(config: &Config) -> Result<()> {
    let table = OverrideTable::load(config.overrides.path.as_deref());
    if table.is_empty() {
        println!("no source overrides loaded");
        return Ok(());
    }

    println!("{:<40} {:<8} URL", "ITEM", "HOST");
    for (id, entry) in table.iter() {
        println!("{:<40} {:<8} {}", id, entry.host_kind, entry.url);
        if let Some(notes) = &entry.notes {
            println!("{:<40} {:<8} # {}", "", "", notes);
        }
    }
    Ok(())
}
