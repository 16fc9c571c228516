// server/src/directory.rs
//! Adapts [`UserStore`] to [`notifier::UserDirectory`] so the C5 dispatcher
//! never depends on the edge's auth storage directly.
use std::sync::Arc;

use async_trait::async_trait;
use notifier::UserDirectory;
use shared_models::User;

use crate::users::UserStore;

pub struct ServerUserDirectory(pub Arc<UserStore>);

#[async_trait]
impl UserDirectory for ServerUserDirectory {
    async fn find(&self, user_id: i64) -> Option<User> {
        self.0.find_by_id(user_id).ok().flatten()
    }
}
