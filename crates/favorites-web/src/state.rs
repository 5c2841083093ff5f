//! Shared handler state.

use article_rpc::ArticleValidator;
use std::sync::Arc;

use crate::auth::IdentityProvider;
use crate::repository::FavoriteRepository;

/// Handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn FavoriteRepository>,
    pub validator: Arc<ArticleValidator>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn FavoriteRepository>,
        validator: Arc<ArticleValidator>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            repository,
            validator,
            identity,
        }
    }
}
