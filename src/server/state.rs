use crate::assets::AssetStore;
use crate::settings;

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) settings: settings::Settings,
    pub(crate) key: String,
}

impl ServerState {
    pub(crate) fn store(&self) -> AssetStore {
        AssetStore::new(self.settings.assets_dir.clone())
    }
}
