use derive_new::new;

use super::ApiKey;
use crate::store::ViewStore;

#[derive(Debug, Clone, new)]
pub struct App {
    pub store: ViewStore,
    pub api_key: ApiKey,
}
