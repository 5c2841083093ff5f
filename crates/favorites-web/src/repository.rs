//! Favorites repository layer.
//!
//! # Architecture
//!
//! - `FavoriteRepository`: trait with the document-store operations the API needs
//! - `InMemoryFavoriteRepository`: in-memory implementation
//!
//! Every store honours a unique index on `(user_id, product_id)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use ulid::Ulid;

/// A product a user marked as favorite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: Ulid,
    pub product_id: String,
    pub user_id: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Favorite {
    /// Creates a new favorite stamped with the current time.
    #[must_use]
    pub fn new(user_id: String, product_id: String, notes: String) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new(),
            product_id,
            user_id,
            notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Aggregated popularity of one product across all users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularProduct {
    pub product_id: String,
    pub favorite_count: u64,
    pub last_added: DateTime<Utc>,
}

/// Window into a user's favorites, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    /// `None` returns everything after `skip`.
    pub limit: Option<usize>,
}

impl Page {
    #[must_use]
    pub const fn first(limit: usize) -> Self {
        Self {
            skip: 0,
            limit: Some(limit),
        }
    }
}

/// Repository errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Favorite not found.
    #[error("Favorite not found: {id}")]
    NotFound { id: Ulid },

    /// The (user, product) pair already exists.
    #[error("Product {product_id} is already a favorite of user {user_id}")]
    Duplicate { user_id: String, product_id: String },
}

/// Repository trait for favorites data access.
#[async_trait]
pub trait FavoriteRepository: Send + Sync {
    /// Finds the favorite for a (user, product) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn find(&self, user_id: &str, product_id: &str)
    -> Result<Option<Favorite>, RepositoryError>;

    /// Inserts a new favorite.
    ///
    /// # Errors
    ///
    /// Returns `Duplicate` if the (user, product) pair already exists.
    async fn insert(&self, favorite: Favorite) -> Result<Favorite, RepositoryError>;

    /// Replaces the notes of a favorite and bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the favorite does not exist.
    async fn update_notes(&self, id: Ulid, notes: String) -> Result<Favorite, RepositoryError>;

    /// Deletes a user's favorite by id. Returns whether anything was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn delete_by_id(&self, user_id: &str, id: Ulid) -> Result<bool, RepositoryError>;

    /// Deletes a user's favorite by product. Returns whether anything was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn delete_by_product(&self, user_id: &str, product_id: &str)
    -> Result<bool, RepositoryError>;

    /// Lists a user's favorites, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn list(&self, user_id: &str, page: Page) -> Result<Vec<Favorite>, RepositoryError>;

    /// Counts a user's favorites.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn count(&self, user_id: &str) -> Result<u64, RepositoryError>;

    /// Counts a user's favorites created at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn count_since(&self, user_id: &str, since: DateTime<Utc>)
    -> Result<u64, RepositoryError>;

    /// Most favorited products across all users.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn popular(&self, limit: usize) -> Result<Vec<PopularProduct>, RepositoryError>;
}

#[derive(Default)]
struct Store {
    by_id: HashMap<Ulid, Favorite>,
    by_user_product: HashMap<(String, String), Ulid>,
}

/// In-memory favorites store.
#[derive(Default)]
pub struct InMemoryFavoriteRepository {
    store: RwLock<Store>,
}

impl InMemoryFavoriteRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn count_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[async_trait]
impl FavoriteRepository for InMemoryFavoriteRepository {
    async fn find(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> Result<Option<Favorite>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store
            .by_user_product
            .get(&(user_id.to_string(), product_id.to_string()))
            .and_then(|id| store.by_id.get(id))
            .cloned())
    }

    async fn insert(&self, favorite: Favorite) -> Result<Favorite, RepositoryError> {
        let mut store = self.store.write().await;
        let key = (favorite.user_id.clone(), favorite.product_id.clone());

        if store.by_user_product.contains_key(&key) {
            return Err(RepositoryError::Duplicate {
                user_id: key.0,
                product_id: key.1,
            });
        }

        store.by_user_product.insert(key, favorite.id);
        store.by_id.insert(favorite.id, favorite.clone());
        Ok(favorite)
    }

    async fn update_notes(&self, id: Ulid, notes: String) -> Result<Favorite, RepositoryError> {
        let mut store = self.store.write().await;
        let favorite = store
            .by_id
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound { id })?;

        favorite.notes = notes;
        favorite.updated_at = Utc::now();
        Ok(favorite.clone())
    }

    async fn delete_by_id(&self, user_id: &str, id: Ulid) -> Result<bool, RepositoryError> {
        let mut store = self.store.write().await;
        let owned = store
            .by_id
            .get(&id)
            .is_some_and(|favorite| favorite.user_id == user_id);

        if !owned {
            return Ok(false);
        }
        if let Some(favorite) = store.by_id.remove(&id) {
            store
                .by_user_product
                .remove(&(favorite.user_id, favorite.product_id));
        }
        Ok(true)
    }

    async fn delete_by_product(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> Result<bool, RepositoryError> {
        let mut store = self.store.write().await;
        let removed = store
            .by_user_product
            .remove(&(user_id.to_string(), product_id.to_string()));

        Ok(removed.is_some_and(|id| store.by_id.remove(&id).is_some()))
    }

    async fn list(&self, user_id: &str, page: Page) -> Result<Vec<Favorite>, RepositoryError> {
        let store = self.store.read().await;
        let mut favorites: Vec<&Favorite> = store
            .by_id
            .values()
            .filter(|favorite| favorite.user_id == user_id)
            .collect();
        favorites.sort_by_key(|favorite| Reverse((favorite.created_at, favorite.id)));

        Ok(favorites
            .into_iter()
            .skip(page.skip)
            .take(page.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, user_id: &str) -> Result<u64, RepositoryError> {
        let store = self.store.read().await;
        Ok(count_u64(
            store
                .by_id
                .values()
                .filter(|favorite| favorite.user_id == user_id)
                .count(),
        ))
    }

    async fn count_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let store = self.store.read().await;
        Ok(count_u64(
            store
                .by_id
                .values()
                .filter(|favorite| favorite.user_id == user_id && favorite.created_at >= since)
                .count(),
        ))
    }

    async fn popular(&self, limit: usize) -> Result<Vec<PopularProduct>, RepositoryError> {
        let store = self.store.read().await;
        let mut groups: HashMap<&str, PopularProduct> = HashMap::new();

        for favorite in store.by_id.values() {
            groups
                .entry(favorite.product_id.as_str())
                .and_modify(|group| {
                    group.favorite_count = group.favorite_count.saturating_add(1);
                    group.last_added = group.last_added.max(favorite.created_at);
                })
                .or_insert_with(|| PopularProduct {
                    product_id: favorite.product_id.clone(),
                    favorite_count: 1,
                    last_added: favorite.created_at,
                });
        }

        let mut popular: Vec<PopularProduct> = groups.into_values().collect();
        popular.sort_by(|a, b| {
            b.favorite_count
                .cmp(&a.favorite_count)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        popular.truncate(limit);
        Ok(popular)
    }
}
