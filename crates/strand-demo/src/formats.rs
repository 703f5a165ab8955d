//! Demo resource formats
//!
//! `.manifest` files are text: `name: <name>` sets a display name, and
//! `dep: [<type>] <path>` loads another resource, its type taken from the
//! path's extension when omitted. Blank lines and `#` comments are ignored.
//! Every other file is a blob: opaque bytes with a checksum.

use std::any::Any;
use strand_resource::{
    LoadContext, ParseError, ResourceBody, ResourceHub, ResourcePath, ResourceResult, ResourceType,
};
use xxhash_rust::xxh3::xxh3_64;

/// Type name of manifests
pub const MANIFEST_TYPE: &str = "manifest";
/// Type name of blobs
pub const BLOB_TYPE: &str = "blob";

/// Type name for `path`, from its extension
pub fn type_name_for(path: &str) -> &'static str {
    if path.to_ascii_lowercase().ends_with(".manifest") {
        MANIFEST_TYPE
    } else {
        BLOB_TYPE
    }
}

/// Registered demo types
#[derive(Debug, Clone, Copy)]
pub struct Formats {
    /// Manifest type
    pub manifest: ResourceType,
    /// Blob type
    pub blob: ResourceType,
}

impl Formats {
    /// Register both formats with `hub`
    pub fn register(hub: &ResourceHub) -> ResourceResult<Self> {
        let manifest = hub.register(MANIFEST_TYPE, |_: &ResourcePath| -> Box<dyn ResourceBody> {
            Box::new(Manifest::default())
        })?;
        let blob = hub.register(BLOB_TYPE, |_: &ResourcePath| -> Box<dyn ResourceBody> {
            Box::new(Blob::default())
        })?;
        Ok(Self { manifest, blob })
    }

    /// Resource type for `path`
    pub fn type_for(&self, path: &str) -> ResourceType {
        match type_name_for(path) {
            MANIFEST_TYPE => self.manifest,
            _ => self.blob,
        }
    }
}

/// Parsed manifest
#[derive(Debug, Default)]
pub struct Manifest {
    /// Display name, if the manifest sets one
    pub name: Option<String>,
    /// Dependency paths in declaration order
    pub dependencies: Vec<String>,
}

impl ResourceBody for Manifest {
    fn parse(&mut self, data: &[u8], ctx: &mut LoadContext<'_>) -> Result<(), ParseError> {
        let text = std::str::from_utf8(data)?;
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix("name:") {
                self.name = Some(name.trim().to_string());
            } else if let Some(dep) = line.strip_prefix("dep:") {
                let parts: Vec<&str> = dep.split_whitespace().collect();
                let (type_name, path) = match parts.as_slice() {
                    [path] => (type_name_for(path), *path),
                    [type_name, path] => (*type_name, *path),
                    _ => {
                        return Err(
                            format!("line {}: expected `dep: [type] path`", number + 1).into()
                        )
                    }
                };
                ctx.load(ResourceType::of(type_name), path)?;
                self.dependencies.push(path.to_string());
            } else {
                return Err(
                    format!("line {}: unrecognized directive '{}'", number + 1, line).into(),
                );
            }
        }
        Ok(())
    }

    fn unload(&mut self) {
        self.name = None;
        self.dependencies.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Opaque file contents
#[derive(Debug, Default)]
pub struct Blob {
    /// Length in bytes
    pub len: usize,
    /// xxh3 checksum of the contents
    pub checksum: u64,
}

impl ResourceBody for Blob {
    fn parse(&mut self, data: &[u8], _ctx: &mut LoadContext<'_>) -> Result<(), ParseError> {
        self.len = data.len();
        self.checksum = xxh3_64(data);
        Ok(())
    }

    fn unload(&mut self) {
        *self = Self::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
