use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path as LocalPath;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use serde::Serialize;

use crate::{
    columnar::{decode_batches, encode_batches, ParquetMerger},
    paths::{clean_path, VALID_FILE_TYPES},
    Result, WarehouseError,
};

/// Content of a stored object, chosen by its extension.
#[derive(Debug, Clone)]
pub enum Document {
    /// `.json` objects.
    Json(serde_json::Value),
    /// `.parquet` objects.
    Table(Vec<RecordBatch>),
}

/// Nested listing of a prefix.
///
/// Serializes as `{"files": [..], "<folder>": {..}}`, with `files` omitted
/// when a folder holds none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryTree {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(flatten)]
    pub folders: BTreeMap<String, DirectoryTree>,
}

impl DirectoryTree {
    fn insert(&mut self, parts: &[String]) {
        match parts {
            [] => {}
            [name] if name.contains('.') => {
                if !self.files.contains(name) {
                    self.files.push(name.clone());
                }
            }
            [folder, rest @ ..] => self
                .folders
                .entry(folder.clone())
                .or_default()
                .insert(rest),
        }
    }

    fn sort(&mut self) {
        self.files.sort();
        for folder in self.folders.values_mut() {
            folder.sort();
        }
    }
}

enum FileKind {
    Json,
    Parquet,
}

fn file_kind(path: &str) -> Result<FileKind> {
    let name = path.rsplit('/').next().unwrap_or_default();
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("json") => Ok(FileKind::Json),
        Some("parquet") => Ok(FileKind::Parquet),
        _ => Err(WarehouseError::UnsupportedFileType(format!(
            "'{path}' is not one of {VALID_FILE_TYPES:?}"
        ))),
    }
}

/// Bucket access for JSON and Parquet documents.
///
/// Every path argument is passed through [`clean_path`] first, so
/// `"/raw//2024"` and `"raw/2024/"` address the same prefix.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("bucket", &self.bucket)
            .field("store", &self.store.to_string())
            .finish()
    }
}

impl ObjectStorage {
    /// Connects to an S3 bucket with static credentials.
    pub fn new(
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self> {
        let bucket = bucket.into();
        let store = AmazonS3Builder::new()
            .with_bucket_name(&bucket)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key)
            .with_region(region)
            .build()?;
        Ok(Self::with_store(bucket, Arc::new(store)))
    }

    /// Connects to an S3 bucket, taking credentials and region from the
    /// standard `AWS_*` environment variables.
    pub fn from_env(bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .build()?;
        Ok(Self::with_store(bucket, Arc::new(store)))
    }

    /// Uses any store, e.g. `object_store::memory::InMemory` in tests.
    pub fn with_store(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Names of the files and folders directly under `path`.
    pub async fn get_directory(&self, path: &str) -> Result<Vec<String>> {
        let keys = self.list_relative(path).await?;
        let names: BTreeSet<String> = keys
            .into_iter()
            .filter_map(|parts| parts.into_iter().next())
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Everything under `path` as a nested tree.
    pub async fn get_directory_tree(&self, path: &str) -> Result<DirectoryTree> {
        let mut tree = DirectoryTree::default();
        for parts in self.list_relative(path).await? {
            tree.insert(&parts);
        }
        tree.sort();
        Ok(tree)
    }

    /// Writes a document. JSON goes to `.json` keys, tables to `.parquet`.
    pub async fn upload_object(&self, document: Document, path: &str) -> Result<()> {
        let location = object_path(path)?;
        match (file_kind(location.as_ref())?, document) {
            (FileKind::Json, Document::Json(value)) => {
                let body = serde_json::to_vec(&value)?;
                let mut attributes = Attributes::new();
                attributes.insert(Attribute::ContentType, "application/json".into());
                let opts = PutOptions {
                    attributes,
                    ..Default::default()
                };
                self.store
                    .put_opts(&location, PutPayload::from(body), opts)
                    .await?;
            }
            (FileKind::Parquet, Document::Table(batches)) => {
                let body = encode_batches(&batches)?;
                self.store.put(&location, PutPayload::from(body)).await?;
            }
            (FileKind::Json, Document::Table(_)) => {
                return Err(WarehouseError::UnsupportedFileType(format!(
                    "tables must be stored as .parquet, got '{location}'"
                )))
            }
            (FileKind::Parquet, Document::Json(_)) => {
                return Err(WarehouseError::UnsupportedFileType(format!(
                    "JSON must be stored as .json, got '{location}'"
                )))
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(bucket = %self.bucket, key = %location, "uploaded object");
        Ok(())
    }

    /// Reads a `.json` or `.parquet` object.
    pub async fn get_object(&self, path: &str) -> Result<Document> {
        let location = object_path(path)?;
        let kind = file_kind(location.as_ref())?;
        let bytes = self.read(&location).await?;
        match kind {
            FileKind::Json => Ok(Document::Json(serde_json::from_slice(&bytes)?)),
            FileKind::Parquet => Ok(Document::Table(decode_batches(bytes)?)),
        }
    }

    /// Copies a local file to `path` as-is.
    pub async fn upload_file(&self, local: impl AsRef<LocalPath>, path: &str) -> Result<()> {
        let location = object_path(path)?;
        let body = tokio::fs::read(local.as_ref()).await?;
        self.store.put(&location, PutPayload::from(body)).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(bucket = %self.bucket, key = %location, "uploaded file");
        Ok(())
    }

    /// Copies the object at `path` to a local file, overwriting it.
    pub async fn download_file(&self, path: &str, local: impl AsRef<LocalPath>) -> Result<()> {
        let location = object_path(path)?;
        let bytes = self.read(&location).await?;
        tokio::fs::write(local.as_ref(), &bytes).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let location = object_path(path)?;
        self.store.delete(&location).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(bucket = %self.bucket, key = %location, "deleted object");
        Ok(())
    }

    /// Copies `source` to `destination`; with `must_delete` the source is
    /// removed afterwards, turning the copy into a move.
    pub async fn copy_object(&self, source: &str, destination: &str, must_delete: bool) -> Result<()> {
        let from = object_path(source)?;
        let to = object_path(destination)?;
        self.store.copy(&from, &to).await?;
        if must_delete {
            self.store.delete(&from).await?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(bucket = %self.bucket, from = %from, to = %to, moved = must_delete, "copied object");
        Ok(())
    }

    /// Concatenates Parquet objects into one object at `output`.
    ///
    /// Names without a `.parquet` extension are skipped. Files are streamed
    /// `batch_size` rows at a time into a writer built from the first
    /// batch's schema.
    pub async fn combine_parquet_files<S: AsRef<str>>(
        &self,
        output: &str,
        files: &[S],
        batch_size: usize,
    ) -> Result<()> {
        let target = object_path(output)?;
        if !matches!(file_kind(target.as_ref())?, FileKind::Parquet) {
            return Err(WarehouseError::UnsupportedFileType(format!(
                "merge output '{target}' must be a .parquet file"
            )));
        }

        let inputs: Vec<&str> = files
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| name.trim_end().ends_with(".parquet"))
            .collect();
        if inputs.is_empty() {
            return Err(WarehouseError::NoFilesFound(
                "no parquet files to combine".to_owned(),
            ));
        }

        let mut merger = ParquetMerger::new(batch_size);
        for input in inputs {
            let bytes = self.read(&object_path(input)?).await?;
            merger.append(bytes)?;
        }

        #[cfg(feature = "tracing")]
        let rows = merger.rows();
        let merged = merger
            .finish()?
            .ok_or_else(|| WarehouseError::NoFilesFound("no data was written".to_owned()))?;
        self.store.put(&target, PutPayload::from(merged)).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(bucket = %self.bucket, key = %target, rows, "combined parquet files");
        Ok(())
    }

    async fn read(&self, location: &Path) -> Result<Bytes> {
        Ok(self.store.get(location).await?.bytes().await?)
    }

    /// Keys under `path`, split into segments relative to it.
    async fn list_relative(&self, path: &str) -> Result<Vec<Vec<String>>> {
        let cleaned = clean_path(path);
        let prefix = if cleaned.is_empty() {
            None
        } else {
            Some(object_path(&cleaned)?)
        };

        let mut keys = Vec::new();
        let mut stream = self.store.list(prefix.as_ref());
        while let Some(meta) = stream.next().await {
            let location = meta?.location;
            let parts: Vec<String> = match &prefix {
                Some(prefix) => match location.prefix_match(prefix) {
                    Some(parts) => parts.map(|part| part.as_ref().to_owned()).collect(),
                    None => continue,
                },
                None => location.parts().map(|part| part.as_ref().to_owned()).collect(),
            };
            if !parts.is_empty() {
                keys.push(parts);
            }
        }

        if keys.is_empty() {
            return Err(WarehouseError::NoFilesFound(format!(
                "nothing under '{cleaned}' in bucket '{}'",
                self.bucket
            )));
        }
        Ok(keys)
    }
}

fn object_path(path: &str) -> Result<Path> {
    let cleaned = clean_path(path);
    if cleaned.is_empty() {
        return Err(WarehouseError::InvalidPath("object path is empty".to_owned()));
    }
    Path::parse(&cleaned).map_err(|err| WarehouseError::InvalidPath(err.to_string()))
}
