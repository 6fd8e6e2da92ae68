use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::catalog::{CART_DOCUMENT, Catalog, RESULT_DOCUMENT};
use crate::error::DiscoveryError;
use crate::types::*;

/// What a cart removal applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartTarget {
    /// Empty the cart
    All,
    /// One resource
    Resource(ResourceId),
}

impl FromStr for CartTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<ResourceId>()
            .map(Self::Resource)
            .map_err(|_| format!("'{}' is neither a resource id nor 'all'", s))
    }
}

struct State {
    result: Arc<SearchResult>,
    cart: Arc<Vec<CartEntry>>,
}

/// Holds the published [`SearchResult`] and the cart.
///
/// Readers get immutable snapshots. Every change builds a new value, flushes
/// it to the catalog and only then swaps it in, all under one write lock, so
/// a publish and a cart edit never interleave.
pub struct ResultStore {
    catalog: Catalog,
    state: RwLock<State>,
}

impl ResultStore {
    /// Restore the last flushed result and cart
    pub async fn load(catalog: Catalog) -> Result<Self, DiscoveryError> {
        let result: SearchResult = catalog.load_document(RESULT_DOCUMENT).await?.unwrap_or_default();
        let cart: Vec<CartEntry> = catalog.load_document(CART_DOCUMENT).await?.unwrap_or_default();
        debug!(
            "Restored {} result entries and {} cart entries",
            result.data.len(),
            cart.len()
        );

        Ok(Self {
            catalog,
            state: RwLock::new(State {
                result: Arc::new(result),
                cart: Arc::new(cart),
            }),
        })
    }

    /// Snapshot of the published result
    pub async fn current(&self) -> Arc<SearchResult> {
        self.state.read().await.result.clone()
    }

    /// Snapshot of the cart
    pub async fn cart(&self) -> Arc<Vec<CartEntry>> {
        self.state.read().await.cart.clone()
    }

    /// Ids currently in the cart
    pub async fn cart_ids(&self) -> HashSet<ResourceId> {
        self.state.read().await.cart.iter().map(|e| e.id).collect()
    }

    /// Replace the published result, returning the one it replaced.
    ///
    /// Cart flags are recomputed against the cart at swap time, so an edit
    /// made while the run was in flight is not lost.
    pub async fn publish(&self, mut result: SearchResult) -> Result<Arc<SearchResult>, DiscoveryError> {
        let mut state = self.state.write().await;

        let in_cart: HashSet<ResourceId> = state.cart.iter().map(|e| e.id).collect();
        for entry in &mut result.data {
            entry.added_to_cart = in_cart.contains(&entry.id);
        }

        self.catalog.flush_document(RESULT_DOCUMENT, &result).await?;
        let previous = std::mem::replace(&mut state.result, Arc::new(result));

        info!("Published {} entries", state.result.data.len());
        Ok(previous)
    }

    /// Add the published entry for `id` to the cart
    pub async fn add_to_cart(&self, id: ResourceId) -> Result<CartEntry, DiscoveryError> {
        let mut state = self.state.write().await;

        let Some(mut entry) = state.result.data.iter().find(|e| e.id == id).cloned() else {
            return Err(DiscoveryError::NotFound(format!("resource {} is not in the current result", id)));
        };
        entry.added_to_cart = true;

        let mut cart: Vec<CartEntry> = state.cart.iter().filter(|e| e.id != id).cloned().collect();
        cart.push(entry.clone());

        let result = with_flag(&state.result, |entry_id| entry_id == id, true);

        self.catalog.flush_cart(&cart, &result).await?;
        state.cart = Arc::new(cart);
        state.result = Arc::new(result);

        debug!("Resource {} added to cart", id);
        Ok(entry)
    }

    /// Remove one resource, or everything, from the cart; returns the number removed
    pub async fn remove_from_cart(&self, target: CartTarget) -> Result<usize, DiscoveryError> {
        let mut state = self.state.write().await;

        let matches = |entry_id: ResourceId| match target {
            CartTarget::All => true,
            CartTarget::Resource(id) => entry_id == id,
        };

        let cart: Vec<CartEntry> = state.cart.iter().filter(|e| !matches(e.id)).cloned().collect();
        let removed = state.cart.len() - cart.len();
        let result = with_flag(&state.result, matches, false);

        self.catalog.flush_cart(&cart, &result).await?;
        state.cart = Arc::new(cart);
        state.result = Arc::new(result);

        debug!("Removed {} cart entries ({:?})", removed, target);
        Ok(removed)
    }
}

fn with_flag(result: &SearchResult, selected: impl Fn(ResourceId) -> bool, flag: bool) -> SearchResult {
    let mut copy = result.clone();
    for entry in copy.data.iter_mut().filter(|e| selected(e.id)) {
        entry.added_to_cart = flag;
    }
    copy
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::tests::memory_catalog;
    use catalog_db::database::create_memory_pool;
    use chrono::NaiveDate;

    pub(crate) fn entry(id: ResourceId, full_name: &str, site: &str) -> SearchEntry {
        SearchEntry {
            id,
            site: site.to_string(),
            full_name: full_name.to_string(),
            attributes: Vec::new(),
            category: Some("Campsite".to_string()),
            description: String::new(),
            start_date: NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 7, 12).unwrap(),
            nights: 5,
            capacity: 6,
            booking_url: format!("https://example.test/{}", id),
            added_to_cart: false,
        }
    }

    fn result(ids: &[ResourceId]) -> SearchResult {
        SearchResult {
            time: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap().and_hms_opt(6, 0, 0),
            data: ids.iter().map(|&id| entry(id, "Park A", &id.to_string())).collect(),
        }
    }

    #[test]
    fn test_cart_target_parsing() {
        assert_eq!("all".parse::<CartTarget>(), Ok(CartTarget::All));
        assert_eq!("ALL".parse::<CartTarget>(), Ok(CartTarget::All));
        assert_eq!("-101".parse::<CartTarget>(), Ok(CartTarget::Resource(-101)));
        assert!("some".parse::<CartTarget>().is_err());
    }

    #[tokio::test]
    async fn test_cart_flag_survives_republish() {
        let store = ResultStore::load(memory_catalog().await).await.unwrap();
        store.publish(result(&[101, 102])).await.unwrap();

        let added = store.add_to_cart(101).await.unwrap();
        assert!(added.added_to_cart);

        let previous = store.publish(result(&[101, 103])).await.unwrap();
        assert_eq!(previous.data.len(), 2);

        let current = store.current().await;
        assert!(current.data.iter().find(|e| e.id == 101).unwrap().added_to_cart);
        assert!(!current.data.iter().find(|e| e.id == 103).unwrap().added_to_cart);
        assert_eq!(store.cart().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_is_not_duplicated_and_unknown_is_not_found() {
        let store = ResultStore::load(memory_catalog().await).await.unwrap();
        store.publish(result(&[101])).await.unwrap();

        store.add_to_cart(101).await.unwrap();
        store.add_to_cart(101).await.unwrap();
        assert_eq!(store.cart().await.len(), 1);

        assert!(matches!(
            store.add_to_cart(999).await,
            Err(DiscoveryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_one_and_all() {
        let store = ResultStore::load(memory_catalog().await).await.unwrap();
        store.publish(result(&[101, 102, 103])).await.unwrap();
        for id in [101, 102, 103] {
            store.add_to_cart(id).await.unwrap();
        }

        assert_eq!(store.remove_from_cart(CartTarget::Resource(102)).await.unwrap(), 1);
        assert_eq!(store.cart_ids().await, HashSet::from([101, 103]));
        let current = store.current().await;
        assert!(!current.data.iter().find(|e| e.id == 102).unwrap().added_to_cart);

        assert_eq!(store.remove_from_cart(CartTarget::All).await.unwrap(), 2);
        assert!(store.cart().await.is_empty());
        assert!(store.current().await.data.iter().all(|e| !e.added_to_cart));
    }

    #[tokio::test]
    async fn test_failed_cart_flush_changes_nothing() {
        let pool = create_memory_pool().await.unwrap();
        let catalog = Catalog::new(pool.clone());
        let store = ResultStore::load(catalog.clone()).await.unwrap();
        store.publish(result(&[101])).await.unwrap();

        sqlx::query(
            r#"
            CREATE TRIGGER result_frozen BEFORE UPDATE ON documents
            WHEN NEW.name = 'searchResult'
            BEGIN SELECT RAISE(ABORT, 'result is frozen'); END
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(matches!(
            store.add_to_cart(101).await,
            Err(DiscoveryError::Catalog(_))
        ));

        assert!(store.cart().await.is_empty());
        assert!(!store.current().await.data[0].added_to_cart);
        let stored: Option<Vec<CartEntry>> = catalog.load_document(CART_DOCUMENT).await.unwrap();
        assert_eq!(stored, None);
    }

    #[tokio::test]
    async fn test_state_is_restored_from_documents() {
        let catalog = memory_catalog().await;
        {
            let store = ResultStore::load(catalog.clone()).await.unwrap();
            store.publish(result(&[101, 102])).await.unwrap();
            store.add_to_cart(102).await.unwrap();
        }

        let restored = ResultStore::load(catalog).await.unwrap();
        assert_eq!(restored.current().await.data.len(), 2);
        assert_eq!(restored.cart_ids().await, HashSet::from([102]));
    }
}
