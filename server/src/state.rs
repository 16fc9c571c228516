// server/src/state.rs
use std::sync::Arc;

use ledger::Store;
use notifier::Mailer;
use price_cache::PriceCache;

use crate::config::Config;
use crate::users::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub users: Arc<UserStore>,
    pub cache: Arc<PriceCache>,
    pub mailer: Arc<dyn Mailer>,
    pub config: &'static Config,
}
