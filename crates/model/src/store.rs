use async_trait::async_trait;
use shikake_core::model::entity::ModelState;
use shikake_core::model::error::StoreError;
use shikake_core::model::port::ModelStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "model_v";
const FILE_SUFFIX: &str = ".json";

/// # Summary
/// 基于本地目录的模型存储，每个版本一个 JSON 文件。
///
/// # Invariants
/// - 文件名为 `model_v{version}.json`。
/// - 以 `create_new` 打开，已有版本永不覆盖。
pub struct JsonModelStore {
    dir: PathBuf,
}

impl JsonModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, version: u64) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{version}{FILE_SUFFIX}"))
    }

    fn parse_version(name: &str) -> Option<u64> {
        name.strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?
            .parse()
            .ok()
    }
}

fn io_err(e: std::io::Error) -> StoreError {
    StoreError::Io(e.to_string())
}

#[async_trait]
impl ModelStore for JsonModelStore {
    async fn save(&self, state: &ModelState) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        let data = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let path = self.path_for(state.version);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(state.version));
            }
            Err(e) => return Err(io_err(e)),
        };
        file.write_all(data.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        info!("Persisted model v{} to {}", state.version, path.display());
        Ok(())
    }

    async fn load_latest(&self) -> Result<Option<ModelState>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Model directory {} does not exist", self.dir.display());
                return Ok(None);
            }
            Err(e) => return Err(io_err(e)),
        };

        let mut latest: Option<(u64, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let name = entry.file_name();
            let Some(version) = name.to_str().and_then(Self::parse_version) else {
                continue;
            };
            if latest.as_ref().is_none_or(|(v, _)| version > *v) {
                latest = Some((version, entry.path()));
            }
        }

        let Some((version, path)) = latest else {
            return Ok(None);
        };
        let data = tokio::fs::read_to_string(&path).await.map_err(io_err)?;
        let state: ModelState = serde_json::from_str(&data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if state.version != version || !state.parameters.is_valid() {
            warn!(
                "Model file {} is inconsistent (stored version {})",
                path.display(),
                state.version
            );
            return Err(StoreError::Serialization(format!(
                "inconsistent model file {}",
                path.display()
            )));
        }
        Ok(Some(state))
    }
}
