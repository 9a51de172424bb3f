//! Catalog fan-out: discovery, per-item detail fetch, normalization and
//! source resolution.
//!
//! Discovery either takes an explicit id list (never capped) or the
//! catalog's own listing, optionally capped. Each discovered item then gets
//! its detail fetched in its own task. A failed or missing detail only
//! degrades that item to what the listing provided.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::models::Item;
use crate::normalize::{normalize, RawDetail, RawItem};
use crate::resolve::SourceResolver;
use crate::throttle::Throttle;
use crate::traits::CatalogBackend;

/// How a catalog's items are discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// Exactly these native ids, all of them.
    Ids(Vec<String>),
    /// The catalog's own listing, truncated to `cap` items when set.
    Listing { cap: Option<usize> },
}

/// Items of one catalog plus per-stage counters.
#[derive(Debug, Default)]
pub struct Collected {
    pub items: Vec<Item>,
    pub details_found: usize,
    pub details_missing: usize,
    pub details_failed: usize,
}

type DetailSlot = (DateTime<Utc>, Result<Option<RawDetail>, FetchError>);

/// Discover, fetch details concurrently, normalize and resolve.
///
/// Output order equals discovery order. Only a failing discovery call is an
/// error.
pub async fn collect(
    catalog: Arc<dyn CatalogBackend>,
    discovery: Discovery,
    resolver: &SourceResolver<'_>,
    throttle: Arc<dyn Throttle>,
) -> Result<Collected> {
    let raw = discover(catalog.as_ref(), discovery).await?;
    let details = fetch_details(&catalog, &raw, throttle).await;

    let mut collected = Collected::default();
    for (raw_item, slot) in raw.into_iter().zip(details) {
        let (fetched_at, detail) = match slot {
            Some((fetched_at, Ok(Some(detail)))) => {
                collected.details_found += 1;
                (fetched_at, Some(detail))
            }
            Some((fetched_at, Ok(None))) => {
                collected.details_missing += 1;
                debug!(item = %raw_item.item_id(), "no catalog detail");
                (fetched_at, None)
            }
            Some((fetched_at, Err(e))) => {
                collected.details_failed += 1;
                warn!(item = %raw_item.item_id(), error = %e, "detail fetch failed, keeping listing data");
                (fetched_at, None)
            }
            None => {
                collected.details_failed += 1;
                (Utc::now(), None)
            }
        };

        let mut item = normalize(raw_item, detail.as_ref(), fetched_at);
        item.source_repo = resolver.resolve(&item.id, detail.as_ref());
        collected.items.push(item);
    }

    info!(
        catalog = catalog.name(),
        items = collected.items.len(),
        details = collected.details_found,
        missing = collected.details_missing,
        failed = collected.details_failed,
        "collected catalog"
    );
    Ok(collected)
}

async fn discover(catalog: &dyn CatalogBackend, discovery: Discovery) -> Result<Vec<RawItem>> {
    match discovery {
        Discovery::Ids(ids) => catalog
            .list_items_by_ids(&ids)
            .await
            .with_context(|| format!("{}: listing {} ids failed", catalog.name(), ids.len())),
        Discovery::Listing { cap } => {
            let mut items = catalog
                .list_items()
                .await
                .with_context(|| format!("{}: listing failed", catalog.name()))?;
            if let Some(cap) = cap {
                if items.len() > cap {
                    info!(catalog = catalog.name(), listed = items.len(), cap, "capping listing");
                    items.truncate(cap);
                }
            }
            Ok(items)
        }
    }
}

/// One task per item; results land in the slot of the item's index.
async fn fetch_details(
    catalog: &Arc<dyn CatalogBackend>,
    raw: &[RawItem],
    throttle: Arc<dyn Throttle>,
) -> Vec<Option<DetailSlot>> {
    let mut slots: Vec<Option<DetailSlot>> = Vec::with_capacity(raw.len());
    slots.resize_with(raw.len(), || None);

    let mut set = JoinSet::new();
    for (index, item) in raw.iter().enumerate() {
        let catalog = Arc::clone(catalog);
        let throttle = Arc::clone(&throttle);
        let native_id = item.native_id();
        set.spawn(async move {
            let fetched_at = Utc::now();
            let detail = catalog.fetch_detail(&native_id).await;
            if detail.is_ok() {
                throttle.pause().await;
            }
            (index, (fetched_at, detail))
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, slot)) => slots[index] = Some(slot),
            Err(e) => warn!(error = %e, "detail task aborted"),
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HostKind, PackageKind};
    use crate::resolve::{OverrideEntry, OverrideTable};
    use crate::throttle::{CountingThrottle, NoDelay};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Listing of `listed` apps; details keyed by native id.
    struct FakeCatalog {
        listed: usize,
        fail: Vec<&'static str>,
        detail_calls: AtomicUsize,
    }

    impl FakeCatalog {
        fn new(listed: usize) -> Self {
            Self {
                listed,
                fail: Vec::new(),
                detail_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogBackend for FakeCatalog {
        fn name(&self) -> &str {
            "fake"
        }
        fn kind(&self) -> PackageKind {
            PackageKind::Flatpak
        }
        async fn list_items(&self) -> Result<Vec<RawItem>> {
            Ok((0..self.listed)
                .map(|i| RawItem::stub(PackageKind::Flatpak, &format!("org.app.A{i}")))
                .collect())
        }
        async fn fetch_detail(&self, id: &str) -> Result<Option<RawDetail>, FetchError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.iter().any(|f| *f == id) {
                return Err(FetchError::Network("connection reset".to_string()));
            }
            if id.ends_with("Missing") {
                return Ok(None);
            }
            // Uneven latency so tasks finish out of order.
            let delay = 20u64.saturating_sub(id.len() as u64 % 20);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(Some(RawDetail {
                name: format!("Name of {id}"),
                summary: "An app".to_string(),
                urls: BTreeMap::from([(
                    "homepage".to_string(),
                    format!("https://github.com/org/{id}"),
                )]),
                ..Default::default()
            }))
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_id_mode_is_never_capped() {
        let catalog = Arc::new(FakeCatalog::new(0));
        let table = OverrideTable::default();
        let wanted: Vec<String> = (0..60).map(|i| format!("org.app.B{i}")).collect();

        let collected = collect(
            catalog.clone(),
            Discovery::Ids(wanted.clone()),
            &SourceResolver::new(&table),
            Arc::new(NoDelay),
        )
        .await
        .unwrap();

        assert_eq!(collected.items.len(), 60);
        assert_eq!(catalog.detail_calls.load(Ordering::SeqCst), 60);
        let got: Vec<String> = collected.items.iter().map(|i| i.id.clone()).collect();
        let expected: Vec<String> = wanted.iter().map(|id| format!("flatpak:{id}")).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_listing_mode_applies_cap() {
        let catalog = Arc::new(FakeCatalog::new(80));
        let table = OverrideTable::default();

        let collected = collect(
            catalog.clone(),
            Discovery::Listing { cap: Some(50) },
            &SourceResolver::new(&table),
            Arc::new(NoDelay),
        )
        .await
        .unwrap();

        assert_eq!(collected.items.len(), 50);
        assert_eq!(catalog.detail_calls.load(Ordering::SeqCst), 50);
        assert_eq!(collected.items[49].id, "flatpak:org.app.A49");
    }

    #[tokio::test]
    async fn test_detail_failures_are_isolated() {
        let mut fake = FakeCatalog::new(0);
        fake.fail = vec!["org.bad.Bad"];
        let catalog = Arc::new(fake);
        let throttle = CountingThrottle::new();
        let table = OverrideTable::default();

        let collected = collect(
            catalog,
            Discovery::Ids(ids(&["org.good.Good", "org.bad.Bad", "org.gone.Missing"])),
            &SourceResolver::new(&table),
            Arc::new(throttle.clone()),
        )
        .await
        .unwrap();

        assert_eq!(collected.items.len(), 3);
        assert_eq!(collected.details_found, 1);
        assert_eq!(collected.details_failed, 1);
        assert_eq!(collected.details_missing, 1);
        // Courtesy pause only after successful fetches (found or not found).
        assert_eq!(throttle.calls(), 2);

        let good = &collected.items[0];
        assert_eq!(good.name, "Name of org.good.Good");
        assert_eq!(good.host_kind(), Some(HostKind::Github));

        let bad = &collected.items[1];
        assert_eq!(bad.id, "flatpak:org.bad.Bad");
        assert_eq!(bad.summary, "Flatpak package: org.bad.Bad");
        assert!(bad.source_repo.is_none());
    }

    #[tokio::test]
    async fn test_override_applies_without_detail() {
        let mut fake = FakeCatalog::new(0);
        fake.fail = vec!["org.bad.Bad"];
        let mut entries = BTreeMap::new();
        entries.insert(
            "flatpak:org.bad.Bad".to_string(),
            OverrideEntry {
                host_kind: HostKind::Gitlab,
                url: "https://gitlab.com/bad/bad".to_string(),
                owner: Some("bad".to_string()),
                repo: Some("bad".to_string()),
                notes: None,
            },
        );
        let table = OverrideTable::new(entries);

        let collected = collect(
            Arc::new(fake),
            Discovery::Ids(ids(&["org.bad.Bad"])),
            &SourceResolver::new(&table),
            Arc::new(NoDelay),
        )
        .await
        .unwrap();

        assert_eq!(collected.items[0].host_kind(), Some(HostKind::Gitlab));
    }

    struct BrokenListing;

    #[async_trait]
    impl CatalogBackend for BrokenListing {
        fn name(&self) -> &str {
            "broken"
        }
        fn kind(&self) -> PackageKind {
            PackageKind::Flatpak
        }
        async fn list_items(&self) -> Result<Vec<RawItem>> {
            anyhow::bail!("upstream down")
        }
        async fn fetch_detail(&self, _id: &str) -> Result<Option<RawDetail>, FetchError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let table = OverrideTable::default();
        let err = collect(
            Arc::new(BrokenListing),
            Discovery::Listing { cap: None },
            &SourceResolver::new(&table),
            Arc::new(NoDelay),
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("upstream down"));
    }
}
