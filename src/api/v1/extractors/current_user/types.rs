use std::sync::Arc;

use crate::services::auth::User;

/// Principal resolved by the guard middleware for this request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Arc<User>);

impl std::ops::Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
