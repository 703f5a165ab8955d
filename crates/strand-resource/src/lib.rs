//! # strand-resource
//!
//! Asynchronous resource loading for Strand.
//!
//! Resources are shared, reference-counted assets identified by type and
//! path. A resource is EMPTY until its own data has been read and parsed and
//! every resource it references is READY; any failure along the way puts it
//! in FAILURE. Observers are told of every transition.
//!
//! Features:
//! - Per-type factories creating type-specific bodies
//! - Asynchronous reads through a pluggable [`FileSystem`]
//! - Dependency tracking between resources during parse
//! - Unload and reload with stale-completion discarding
//! - Completion processing on a [`strand_jobs::JobManager`] or by polling
//!
//! ## Example
//!
//! ```
//! use std::any::Any;
//! use std::sync::Arc;
//! use strand_resource::{
//!     LoadContext, MemoryFileSystem, ParseError, ResourceBody, ResourceHub, ResourcePath,
//! };
//!
//! struct Text(String);
//!
//! impl ResourceBody for Text {
//!     fn parse(&mut self, data: &[u8], _ctx: &mut LoadContext<'_>) -> Result<(), ParseError> {
//!         self.0 = std::str::from_utf8(data)?.to_string();
//!         Ok(())
//!     }
//!     fn unload(&mut self) {
//!         self.0.clear();
//!     }
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! fs.insert("greeting.txt", "hello");
//! let hub = ResourceHub::new(fs);
//! let text = hub
//!     .register("text", |_: &ResourcePath| -> Box<dyn ResourceBody> {
//!         Box::new(Text(String::new()))
//!     })
//!     .unwrap();
//!
//! let greeting = hub.load(text, "greeting.txt").unwrap();
//! hub.update();
//! assert!(greeting.is_ready());
//! assert_eq!(greeting.with_body(|t: &Text| t.0.clone()).as_deref(), Some("hello"));
//! hub.unload(&greeting);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod body;
mod error;
mod fs;
mod hub;
mod manager;
mod path;
mod resource;
mod state;

pub use body::{LoadContext, ParseError, ResourceBody, ResourceFactory};
pub use error::{FsError, FsResult, ResourceError, ResourceResult};
pub use fs::{
    DeliveryMode, DiskFileSystem, FileHandle, FileSystem, MemoryFileSystem, ReadCallback, ReadChunk,
};
pub use hub::ResourceHub;
pub use manager::ResourceManager;
pub use path::{normalize_path, ResourcePath, ResourceType};
pub use resource::{ObserverFn, ObserverId, Resource};
pub use state::ResourceState;
