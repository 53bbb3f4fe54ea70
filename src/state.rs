/*
 * Responsibility
 * - shared context bound to the Router (AppState)
 * - Clone is cheap (everything behind Arc)
 */
use std::sync::Arc;

use crate::middleware::stateful::EnsureFrontendRequestsAreStateful;
use crate::repos::AccessTokenRepository;
use crate::services::auth::{Guard, PersonalAccessTokenFactory};

#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<Guard>,
    pub factory: PersonalAccessTokenFactory,
    /// `None` when no DATABASE_URL is configured.
    pub repository: Option<Arc<dyn AccessTokenRepository>>,
    pub stateful: Arc<EnsureFrontendRequestsAreStateful>,
}

impl AppState {
    pub fn new(
        guard: Arc<Guard>,
        factory: PersonalAccessTokenFactory,
        repository: Option<Arc<dyn AccessTokenRepository>>,
        stateful: Arc<EnsureFrontendRequestsAreStateful>,
    ) -> Self {
        Self {
            guard,
            factory,
            repository,
            stateful,
        }
    }
}
