//! # Release Harness
//!
//! Aggregates package metadata from several upstream catalogs (Flathub,
//! Homebrew, an OS image's release feed), resolves each package's source
//! repository, and enriches it with the changelog published on GitHub or
//! GitLab. The result is one JSON dataset for a static front end.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐
//! │  Catalogs  │──▶│ Normalize │──▶│ Resolve  │──▶│   Enrich   │──▶│ Assemble │
//! │ FH/HB/OS   │   │  + detail │   │ overrides│   │ GitHub/GL  │   │   JSON   │
//! └────────────┘   └───────────┘   └──────────┘   └────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Items, releases, output document |
//! | [`error`] | Classified fetch errors |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`traits`] | Catalog / release backend traits and registry |
//! | [`throttle`] | Courtesy delays between requests |
//! | [`http`] | Shared HTTP client and status policy |
//! | [`markdown`] | Release-note rendering |
//! | [`manifest`] | Brewfile and formula parsing |
//! | [`normalize`] | Raw catalog records → items |
//! | [`resolve`] | Source repository resolution and overrides |
//! | [`catalog_flathub`] | Flathub catalog |
//! | [`catalog_homebrew`] | Homebrew catalog and taps |
//! | [`catalog_os`] | OS release-train catalog |
//! | [`release_github`] | GitHub releases |
//! | [`release_gitlab`] | GitLab releases |
//! | [`collect`] | Catalog fan-out |
//! | [`enrich`] | Release enrichment and merge |
//! | [`assemble`] | Stats, metadata, output writing |
//! | [`pipeline`] | Run modes and stage sequencing |
//! | [`sources`] | `sources` / `overrides` commands |

pub mod assemble;
pub mod catalog_flathub;
pub mod catalog_homebrew;
pub mod catalog_os;
pub mod collect;
pub mod config;
pub mod enrich;
pub mod error;
pub mod http;
pub mod logging;
pub mod manifest;
pub mod markdown;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod release_github;
pub mod release_gitlab;
pub mod resolve;
pub mod sources;
pub mod throttle;
pub mod traits;
