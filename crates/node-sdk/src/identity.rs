//! Device identity: a stable `frgr_<configKey>_<random>` identifier bound to
//! the publishable key and persisted in the settings store.

use std::sync::Arc;

use crate::store::{SettingsStore, KEY_DEVICE_ID};
use forager_domain::Result;

const ID_PREFIX: &str = "frgr";
const SUFFIX_LEN: usize = 10;

pub struct IdentityProvider {
    store: Arc<dyn SettingsStore>,
    config_key: String,
}

impl IdentityProvider {
    pub fn new(store: Arc<dyn SettingsStore>, config_key: impl Into<String>) -> Self {
        Self {
            store,
            config_key: config_key.into(),
        }
    }

    /// The stored identifier, if one was ever generated.
    pub fn current(&self) -> Option<String> {
        self.store.get(KEY_DEVICE_ID)
    }

    /// Returns the identifier for this installation, creating it on first
    /// use.
    ///
    /// Three cases, checked in order: a stored id already bound to the
    /// current key is returned as-is; a stored id in our format but bound to
    /// a different key gets the key portion replaced while the random suffix
    /// carries over (the installation keeps its identity across key
    /// rotations); anything else is replaced wholesale.
    pub fn get_or_generate(&self) -> Result<String> {
        let key_prefix = format!("{ID_PREFIX}_{}_", self.config_key);
        let id = match self.store.get(KEY_DEVICE_ID) {
            Some(id) if id.starts_with(&key_prefix) => return Ok(id),
            Some(id) if id.starts_with(&format!("{ID_PREFIX}_")) => {
                let suffix = id
                    .rsplit_once('_')
                    .map(|(_, s)| s.to_owned())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(random_suffix);
                compose(&self.config_key, &suffix)
            }
            _ => compose(&self.config_key, &random_suffix()),
        };
        self.store.set(KEY_DEVICE_ID, &id)?;
        tracing::info!(device_id = %id, "device identifier generated");
        Ok(id)
    }

    /// Forget the stored identifier. The next call to
    /// [`get_or_generate`](Self::get_or_generate) mints a fresh one.
    pub fn reset(&self) -> Result<()> {
        self.store.delete(KEY_DEVICE_ID)
    }
}

fn compose(config_key: &str, suffix: &str) -> String {
    format!("{ID_PREFIX}_{config_key}_{suffix}")
}

fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_owned()
}
