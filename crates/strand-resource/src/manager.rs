//! Per-type resource table

use crate::body::ResourceFactory;
use crate::error::{ResourceError, ResourceResult};
use crate::path::{ResourcePath, ResourceType};
use crate::resource::Resource;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use strand_metrics::Metrics;

/// Resources of one type, keyed by path hash
///
/// Factories must not load resources from `create`: bodies are created while
/// the table shard is locked.
pub struct ResourceManager {
    resource_type: ResourceType,
    name: RwLock<String>,
    factory: RwLock<Option<Arc<dyn ResourceFactory>>>,
    resources: DashMap<u32, Arc<Resource>>,
}

impl ResourceManager {
    pub(crate) fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            name: RwLock::new(resource_type.to_string()),
            factory: RwLock::new(None),
            resources: DashMap::new(),
        }
    }

    /// Resource type served
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Registered type name, or the hex type id if never registered
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Whether a factory is registered
    pub fn has_factory(&self) -> bool {
        self.factory.read().is_some()
    }

    /// Number of resources in the table
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resource at `path`, if present
    pub fn get(&self, path: &str) -> Option<Arc<Resource>> {
        let key = ResourcePath::new(path).hash();
        self.resources.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// All resources in the table
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        self.resources
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub(crate) fn factory(&self) -> Option<Arc<dyn ResourceFactory>> {
        self.factory.read().clone()
    }

    pub(crate) fn set_factory(
        &self,
        name: &str,
        factory: Arc<dyn ResourceFactory>,
    ) -> ResourceResult<()> {
        let mut slot = self.factory.write();
        if slot.is_some() {
            return Err(ResourceError::AlreadyRegistered(self.resource_type));
        }
        *slot = Some(factory);
        *self.name.write() = name.to_string();
        Ok(())
    }

    /// Find or create the resource at `path` and take a reference
    ///
    /// Returns the epoch to start loading under when this was the first
    /// reference.
    pub(crate) fn acquire(
        &self,
        path: ResourcePath,
        metrics: &Arc<Metrics>,
    ) -> (Arc<Resource>, Option<u64>) {
        let key = path.hash();
        loop {
            let resource = {
                let entry = self.resources.entry(key).or_insert_with(|| {
                    let body = self.factory().map(|factory| factory.create(&path));
                    tracing::trace!("Created resource {} ({})", path, self.resource_type);
                    Arc::new(Resource::new(
                        path.clone(),
                        self.resource_type,
                        body,
                        Arc::clone(metrics),
                    ))
                });
                Arc::clone(entry.value())
            };

            // The shard lock is not held here: a parse holding another
            // resource's body may need this shard.
            let start = resource.acquire();
            let current = self
                .resources
                .get(&key)
                .is_some_and(|entry| Arc::ptr_eq(entry.value(), &resource));
            if current {
                return (resource, start);
            }
            // Purged between the lookup and the reference
            resource.abandon();
        }
    }

    /// Destroy every unreferenced resource; returns how many were removed
    pub fn purge(&self) -> usize {
        let candidates: Vec<u32> = self
            .resources
            .iter()
            .filter(|entry| entry.value().ref_count() == 0)
            .map(|entry| *entry.key())
            .collect();

        let mut purged = 0;
        for key in candidates {
            let removed = self
                .resources
                .remove_if(&key, |_, resource| resource.ref_count() == 0);
            if let Some((_, resource)) = removed {
                self.destroy(&resource);
                purged += 1;
            }
        }
        purged
    }

    /// Destroy every resource regardless of references
    pub(crate) fn clear(&self) -> usize {
        let keys: Vec<u32> = self.resources.iter().map(|entry| *entry.key()).collect();
        let mut cleared = 0;
        for key in keys {
            if let Some((_, resource)) = self.resources.remove(&key) {
                self.destroy(&resource);
                cleared += 1;
            }
        }
        cleared
    }

    fn destroy(&self, resource: &Resource) {
        let Some(body) = resource.retire() else {
            return;
        };
        match self.factory() {
            Some(factory) => factory.destroy(body),
            None => drop(body),
        }
        tracing::trace!("Destroyed resource {}", resource.path());
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("type", &self.resource_type)
            .field("name", &*self.name.read())
            .field("resources", &self.resources.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ResourceManager {
        ResourceManager::new(ResourceType::of("test"))
    }

    #[test]
    fn test_acquire_shares_instance() {
        let manager = manager();
        let metrics = Arc::new(Metrics::new());
        let (first, start) = manager.acquire(ResourcePath::new("a"), &metrics);
        assert_eq!(start, Some(0));
        let (second, start) = manager.acquire(ResourcePath::new("./A"), &metrics);
        assert!(start.is_none());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);
        assert_eq!(first.ref_count(), 2);
    }

    #[test]
    fn test_purge_only_unreferenced() {
        let manager = manager();
        let metrics = Arc::new(Metrics::new());
        let (kept, _) = manager.acquire(ResourcePath::new("kept"), &metrics);
        let (dropped, _) = manager.acquire(ResourcePath::new("dropped"), &metrics);
        dropped.release();

        assert_eq!(manager.purge(), 1);
        assert!(manager.get("kept").is_some());
        assert!(manager.get("dropped").is_none());
        assert_eq!(kept.ref_count(), 1);

        // A purged path gets a fresh instance
        let (again, start) = manager.acquire(ResourcePath::new("dropped"), &metrics);
        assert!(!Arc::ptr_eq(&again, &dropped));
        assert!(start.is_some());
    }

    #[test]
    fn test_name_and_factory() {
        let manager = manager();
        assert_eq!(manager.name(), ResourceType::of("test").to_string());
        assert!(!manager.has_factory());
    }
}
