use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

/// Read access to the object store that batches land in.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, container: &str, key: &str) -> eyre::Result<Vec<u8>>;
}

/// Object store laid out on the local filesystem as `<root>/<container>/<key>`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, container: &str, key: &str) -> eyre::Result<PathBuf> {
        let mut path = self.root.clone();
        for part in [container, key] {
            if part.is_empty() {
                return Err(eyre::eyre!("Empty container or object key"));
            }
            for component in Path::new(part).components() {
                match component {
                    Component::Normal(segment) => path.push(segment),
                    _ => {
                        return Err(eyre::eyre!(
                            "Object path '{}/{}' escapes the store root",
                            container,
                            key
                        ))
                    }
                }
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get_object(&self, container: &str, key: &str) -> eyre::Result<Vec<u8>> {
        let path = self.resolve(container, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| eyre::eyre!("Failed to read object '{}': {}", path.display(), e))
    }
}

/// In-memory object store, keyed by (container, key).
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, container: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .await
            .insert((container.to_string(), key.to_string()), body.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, container: &str, key: &str) -> eyre::Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(container.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| eyre::eyre!("No such object '{}/{}'", container, key))
    }
}
