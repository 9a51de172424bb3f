//! Backend traits for catalogs and release hosts.
//!
//! The pipeline never talks to an upstream directly. Catalog backends yield
//! raw items and optional detail records; release backends yield recent
//! releases for a resolved repository. Both are trait objects so that
//! custom or in-memory implementations can be plugged in.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             BackendRegistry              │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐  │
//! │  │ Flathub  │ │ Homebrew │ │    OS    │  │  catalogs
//! │  └──────────┘ └──────────┘ └──────────┘  │
//! │  ┌──────────┐ ┌──────────┐               │
//! │  │  GitHub  │ │  GitLab  │               │  release hosts
//! │  └──────────┘ └──────────┘               │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!      collect → resolve → enrich → assemble
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::error::FetchError;
use crate::models::{HostKind, PackageKind, Release, SourceRepo};
use crate::normalize::{RawDetail, RawItem};

// ═══════════════════════════════════════════════════════════════════════
// Catalog Backend
// ═══════════════════════════════════════════════════════════════════════

/// An upstream package catalog.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    /// Short name used in logs and `sources` output (e.g. `"flathub"`).
    fn name(&self) -> &str;

    /// The package kind every item of this catalog has.
    fn kind(&self) -> PackageKind;

    /// Discover items on the catalog's own terms (listing, feed, manifests).
    ///
    /// An error here is fatal only for the primary catalog of a run mode.
    async fn list_items(&self) -> Result<Vec<RawItem>>;

    /// Items for an explicit id list. The default builds bare stubs that
    /// [`fetch_detail`](CatalogBackend::fetch_detail) fills in.
    async fn list_items_by_ids(&self, ids: &[String]) -> Result<Vec<RawItem>> {
        Ok(ids
            .iter()
            .map(|id| RawItem::stub(self.kind(), id))
            .collect())
    }

    /// Rich detail for one native id. `Ok(None)` means "not found".
    async fn fetch_detail(&self, native_id: &str) -> Result<Option<RawDetail>, FetchError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Release Backend
// ═══════════════════════════════════════════════════════════════════════

/// A source-repository host that publishes releases.
#[async_trait]
pub trait ReleaseBackend: Send + Sync {
    /// Repositories of this host kind are routed to this backend.
    fn host_kind(&self) -> HostKind;

    /// Whether the backend refuses to run without a token.
    ///
    /// When true and [`has_credential`](ReleaseBackend::has_credential) is
    /// false, the whole stage for this host is skipped.
    fn requires_credential(&self) -> bool {
        false
    }

    fn has_credential(&self) -> bool;

    /// Up to `per_page` most recent releases, newest first.
    ///
    /// A repository without releases (HTTP 404) yields an empty list.
    async fn list_releases(
        &self,
        repo: &SourceRepo,
        per_page: usize,
    ) -> Result<Vec<Release>, FetchError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Holds the catalogs and release hosts of one run.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    catalogs: Vec<Arc<dyn CatalogBackend>>,
    releases: Vec<Arc<dyn ReleaseBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_catalog(&mut self, catalog: Arc<dyn CatalogBackend>) {
        self.catalogs.push(catalog);
    }

    pub fn register_release(&mut self, backend: Arc<dyn ReleaseBackend>) {
        self.releases.push(backend);
    }

    pub fn catalogs(&self) -> &[Arc<dyn CatalogBackend>] {
        &self.catalogs
    }

    pub fn release_backends(&self) -> &[Arc<dyn ReleaseBackend>] {
        &self.releases
    }

    /// First catalog producing `kind`.
    pub fn catalog(&self, kind: PackageKind) -> Option<Arc<dyn CatalogBackend>> {
        self.catalogs.iter().find(|c| c.kind() == kind).cloned()
    }

    /// First release backend serving `host`.
    pub fn release_backend(&self, host: HostKind) -> Option<Arc<dyn ReleaseBackend>> {
        self.releases.iter().find(|b| b.host_kind() == host).cloned()
    }
}
