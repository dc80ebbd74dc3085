use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

use converge_core::{PropertyMap, ProviderReference, Urn};

use crate::error::ProviderError;
use crate::provider::{Loader, ProviderHandle};

/// Key a cached provider instance is stored under: the package/version pair
/// plus a fingerprint of its configuration inputs. A new fingerprint means a
/// new instance — the old one is disposed once its last consumer's `Arc`
/// clone is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceKey {
    pkg: String,
    version: String,
    config_fingerprint: String,
}

/// Deterministic fingerprint of a provider's configuration inputs, used to
/// decide whether an existing cached instance can be reused.
pub fn fingerprint_inputs(inputs: &PropertyMap) -> String {
    let mut keys: Vec<&String> = inputs.keys().collect();
    keys.sort();
    let mut hasher = DefaultHasher::new();
    for k in keys {
        k.hash(&mut hasher);
        // Values are hashed via their canonical JSON rendering so that
        // structurally-equal inputs fingerprint identically regardless of
        // construction order.
        if let Ok(v) = serde_json::to_string(&inputs[k]) {
            v.hash(&mut hasher);
        }
    }
    format!("{:016x}", hasher.finish())
}

struct CachedInstance {
    handle: Arc<dyn ProviderHandle>,
    id: String,
}

/// Maps provider references to live provider instances, loading and
/// configuring new ones on demand and reusing cached instances while their
/// configuration is unchanged.
pub struct ProviderRegistry {
    loader: Arc<dyn Loader>,
    instances: DashMap<InstanceKey, CachedInstance>,
}

impl ProviderRegistry {
    pub fn new(loader: Arc<dyn Loader>) -> Self {
        Self {
            loader,
            instances: DashMap::new(),
        }
    }

    /// Get the cached instance for `(pkg, version, config)`, constructing
    /// and configuring a fresh one if none matches the current fingerprint.
    pub async fn get_or_create(
        &self,
        pkg: &str,
        version: &str,
        provider_id: &str,
        config: &PropertyMap,
    ) -> Result<Arc<dyn ProviderHandle>, ProviderError> {
        let fingerprint = fingerprint_inputs(config);
        let key = InstanceKey {
            pkg: pkg.to_string(),
            version: version.to_string(),
            config_fingerprint: fingerprint,
        };

        if let Some(cached) = self.instances.get(&key) {
            return Ok(cached.handle.clone());
        }

        tracing::info!(pkg, version, "loading provider instance");
        let handle: Arc<dyn ProviderHandle> = Arc::from(self.loader.load(pkg, version).await?);
        handle.configure(config).await.map_err(|e| ProviderError::Configure {
            pkg: pkg.to_string(),
            reason: e.to_string(),
        })?;

        self.instances.insert(
            key,
            CachedInstance {
                handle: handle.clone(),
                id: provider_id.to_string(),
            },
        );
        Ok(handle)
    }

    /// Resolve a wire-form provider reference to its cached instance, if
    /// one has already been loaded under a matching id.
    pub fn resolve(&self, r#ref: &ProviderReference) -> Option<Arc<dyn ProviderHandle>> {
        self.instances
            .iter()
            .find(|entry| entry.id == r#ref.id && entry.key().pkg_matches(&r#ref.urn))
            .map(|entry| entry.handle.clone())
    }

    /// Evict every cached instance whose provider id no longer appears
    /// live, e.g. after a refresh cascades a provider's deletion.
    pub fn evict_stale(&self, still_live_ids: &[String]) {
        self.instances.retain(|_, v| still_live_ids.contains(&v.id));
    }
}

impl InstanceKey {
    fn pkg_matches(&self, urn: &Urn) -> bool {
        urn.r#type() == format!("pulumi:providers:{}", self.pkg)
    }
}

/// Synthesize the default-provider resource type for `pkg`: per the
/// registry's contract, any reference without an explicit provider gets a
/// `pulumi:providers:<pkg>` resource named `default`.
pub fn default_provider_type(pkg: &str) -> String {
    format!("pulumi:providers:{pkg}")
}

pub const DEFAULT_PROVIDER_NAME: &str = "default";
