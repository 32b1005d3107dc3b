use std::sync::Arc;

use agentation_store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Arc<Store>, api_key: Option<String>) -> Self {
        Self {
            store,
            api_key: api_key.map(Arc::from),
        }
    }
}
