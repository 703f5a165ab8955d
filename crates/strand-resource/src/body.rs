//! Type-specific resource behavior

use crate::error::ResourceResult;
use crate::hub::ResourceHub;
use crate::path::{ResourcePath, ResourceType};
use crate::resource::Resource;
use std::any::Any;
use std::sync::Arc;

/// Error returned by a parser
pub type ParseError = Box<dyn std::error::Error + Send + Sync>;

/// Loaded data of one resource type
pub trait ResourceBody: Send + 'static {
    /// Build the in-memory representation from the file contents
    ///
    /// Referenced resources are loaded through `ctx`; the resource becomes
    /// READY only once all of them are.
    fn parse(&mut self, data: &[u8], ctx: &mut LoadContext<'_>) -> Result<(), ParseError>;

    /// Release the loaded data; the body is reused by the next load
    fn unload(&mut self);

    /// Downcasting support for typed access
    fn as_any(&self) -> &dyn Any;
}

/// Creates and destroys bodies of one resource type
pub trait ResourceFactory: Send + Sync + 'static {
    /// New, unloaded body for `path`
    fn create(&self, path: &ResourcePath) -> Box<dyn ResourceBody>;

    /// Dispose of a body when its resource is purged
    fn destroy(&self, body: Box<dyn ResourceBody>) {
        drop(body);
    }
}

impl<F> ResourceFactory for F
where
    F: Fn(&ResourcePath) -> Box<dyn ResourceBody> + Send + Sync + 'static,
{
    fn create(&self, path: &ResourcePath) -> Box<dyn ResourceBody> {
        self(path)
    }
}

/// Handed to [`ResourceBody::parse`] to load referenced resources
pub struct LoadContext<'a> {
    hub: &'a ResourceHub,
    resource: &'a Arc<Resource>,
    epoch: u64,
    dependencies: usize,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn new(hub: &'a ResourceHub, resource: &'a Arc<Resource>, epoch: u64) -> Self {
        Self {
            hub,
            resource,
            epoch,
            dependencies: 0,
        }
    }

    /// Path of the resource being parsed
    pub fn path(&self) -> &ResourcePath {
        self.resource.path()
    }

    /// Number of dependencies loaded so far
    pub fn dependency_count(&self) -> usize {
        self.dependencies
    }

    /// Load a resource this one depends on
    ///
    /// The dependency is held until this resource is unloaded or reloaded.
    pub fn load(
        &mut self,
        resource_type: ResourceType,
        path: &str,
    ) -> ResourceResult<Arc<Resource>> {
        if resource_type == self.resource.resource_type()
            && ResourcePath::new(path) == *self.resource.path()
        {
            return Err(crate::ResourceError::SelfReference(path.to_string()));
        }
        let child = self.hub.load(resource_type, path)?;
        if self.resource.attach_dependency(self.epoch, &child) {
            self.dependencies += 1;
        } else {
            // Unloaded while parsing; the load above is not owned by anyone.
            self.hub.unload(&child);
        }
        Ok(child)
    }
}
