//! 产物与反馈存储实现

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::classification::ClassificationFeedback;
use crate::collaborators::{ArtifactLocator, ArtifactStore, FeedbackStore};

const MEMORY_SCHEME: &str = "mem:";
const FILE_SCHEME: &str = "file:";

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/tiff" => "tiff",
        _ => "bin",
    }
}

/// 内存产物存储
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    items: Mutex<Vec<(String, Vec<u8>)>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, bytes: Vec<u8>, _content_type: &str) -> Result<ArtifactLocator> {
        let locator = format!("{}{}", MEMORY_SCHEME, Uuid::new_v4());
        self.items
            .lock()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?
            .push((locator.clone(), bytes));
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?;
        items
            .iter()
            .find(|(key, _)| key == locator)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| anyhow!("artifact not found: {}", locator))
    }
}

/// 本地目录产物存储
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let name = locator
            .strip_prefix(FILE_SCHEME)
            .ok_or_else(|| anyhow!("not a local locator: {}", locator))?;
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("invalid artifact name: {}", name);
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<ArtifactLocator> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create {}", self.root.display()))?;
        let name = format!("{}.{}", Uuid::new_v4(), extension_for(content_type));
        let path = self.root.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        log::debug!("[Storage] 写入 {}", path.display());
        Ok(format!("{}{}", FILE_SCHEME, name))
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("read {}", path.display()))
    }
}

/// 主存储失败时写入备用存储
pub struct FallbackArtifactStore {
    primary: Arc<dyn ArtifactStore>,
    fallback: Arc<dyn ArtifactStore>,
}

impl FallbackArtifactStore {
    pub fn new(primary: Arc<dyn ArtifactStore>, fallback: Arc<dyn ArtifactStore>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ArtifactStore for FallbackArtifactStore {
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<ArtifactLocator> {
        match self.primary.put(bytes.clone(), content_type).await {
            Ok(locator) => Ok(locator),
            Err(e) => {
                log::warn!("[Storage] 主存储写入失败，改用备用存储: {}", e);
                self.fallback.put(bytes, content_type).await
            }
        }
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        match self.primary.get(locator).await {
            Ok(bytes) => Ok(bytes),
            Err(primary_err) => self.fallback.get(locator).await.map_err(|e| {
                anyhow!("artifact {} unavailable: {}; {}", locator, primary_err, e)
            }),
        }
    }
}

/// 内存反馈存储
#[derive(Debug, Default)]
pub struct InMemoryFeedbackStore {
    records: Mutex<Vec<ClassificationFeedback>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ClassificationFeedback> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// 尚未用于训练的记录
    pub fn pending_training(&self) -> Vec<ClassificationFeedback> {
        self.records()
            .into_iter()
            .filter(|r| !r.has_been_used_for_training())
            .collect()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn append(&self, feedback: ClassificationFeedback) -> Result<String> {
        let id = feedback.id.clone();
        self.records
            .lock()
            .map_err(|_| anyhow!("feedback store lock poisoned"))?
            .push(feedback);
        Ok(id)
    }

    async fn mark_used_for_training(&self, id: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("feedback store lock poisoned"))?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("feedback not found: {}", id))?;
        record.mark_used_for_training();
        Ok(())
    }
}
