//! Transformation pipeline execution.
//!
//! Ties the other modules together: validate → cache check → load → chain
//! operations → persist derived record → write-through cache.
//!
//! ```text
//! request {imageId, transformations}
//!   │ validate (spec module, nothing touched on reject)
//!   ▼
//! cache lookup (key = source id + canonical spec)
//!   │ hit: return cached metadata — no recomputation, no new row
//!   ▼ miss
//! repository lookup → file read → decode once
//!   ▼
//! stage 1 → stage 2 → … → stage N   (each consumes the prior output)
//!   ▼
//! encode once → file write → new derived row → cache write-through
//! ```
//!
//! ## Failure semantics
//!
//! Any stage failure aborts the run and surfaces a [`PipelineError`] naming
//! the failing stage; a file written for an aborted attempt is removed, and
//! no partial derived row is ever committed. Cache trouble is logged and
//! degrades to recompute — it never fails a request.
//!
//! ## Concurrency
//!
//! Each request runs on its own worker against shared collaborators; there
//! is no shared mutable pipeline state. Cache-check-then-compute is not
//! atomic, so two concurrent identical requests may both compute — they
//! produce the same key and equivalent values, and the second write is an
//! idempotent overwrite.

use crate::cache::{self, ResultCache};
use crate::imaging::{OperationError, OutputFormat, Quality, ops};
use crate::record::{self, DerivedImageInfo, ImageRecord, NewImage};
use crate::repository::{ImageRepository, RepositoryError};
use crate::spec::{Operation, TransformationSpec, ValidationError};
use crate::store::{FileStore, StorageError};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid transformation spec: {0}")]
    Validation(#[from] ValidationError),
    #[error("source image not found: {0}")]
    NotFound(i64),
    #[error("{stage} stage failed: {source}")]
    Operation {
        stage: &'static str,
        source: OperationError,
    },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Coarse response class for the request boundary to map onto its wire
/// protocol (4xx/404/5xx for HTTP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    ClientError,
    NotFound,
    ServerError,
}

/// Stable, serializable failure shape returned across the request boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: &'static str,
    pub message: String,
}

impl PipelineError {
    /// Stable failure kind. Repository trouble is storage from the caller's
    /// point of view.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Operation { .. } => "operation",
            Self::Storage(_) | Self::Repository(_) => "storage",
        }
    }

    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::Validation(_) => StatusClass::ClientError,
            Self::NotFound(_) => StatusClass::NotFound,
            Self::Operation { .. } | Self::Storage(_) | Self::Repository(_) => {
                StatusClass::ServerError
            }
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Tunables for pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long memoized results stay fresh.
    pub cache_ttl: Duration,
    /// Encoding quality for lossy output formats.
    pub quality: Quality,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::hours(24),
            quality: Quality::default(),
        }
    }
}

/// The transformation pipeline, borrowing its collaborators for the scope of
/// a request.
pub struct Pipeline<'a> {
    repository: &'a dyn ImageRepository,
    store: &'a dyn FileStore,
    cache: &'a dyn ResultCache,
    config: PipelineConfig,
}

/// The in-flight result of the operation chain, before persistence.
struct StageOutput {
    bytes: Vec<u8>,
    filename: String,
    mime_type: String,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        repository: &'a dyn ImageRepository,
        store: &'a dyn FileStore,
        cache: &'a dyn ResultCache,
    ) -> Self {
        Self::with_config(repository, store, cache, PipelineConfig::default())
    }

    pub fn with_config(
        repository: &'a dyn ImageRepository,
        store: &'a dyn FileStore,
        cache: &'a dyn ResultCache,
        config: PipelineConfig,
    ) -> Self {
        Self {
            repository,
            store,
            cache,
            config,
        }
    }

    /// Validate a raw request mapping and execute it. The full entry point
    /// for the request boundary.
    pub fn transform(
        &self,
        image_id: i64,
        transformations: &Map<String, Value>,
    ) -> Result<DerivedImageInfo, PipelineError> {
        let spec = TransformationSpec::from_request(transformations)?;
        self.execute(image_id, &spec)
    }

    /// Execute a validated spec against the source image.
    pub fn execute(
        &self,
        image_id: i64,
        spec: &TransformationSpec,
    ) -> Result<DerivedImageInfo, PipelineError> {
        let key = cache::transform_key(image_id, spec);

        if let Some(cached) = self.cached_result(&key) {
            tracing::debug!(image_id, "returning memoized transformation result");
            return Ok(cached);
        }

        let source = self
            .repository
            .find_by_id(image_id)?
            .ok_or(PipelineError::NotFound(image_id))?;

        let source_bytes = self.store.read(&source.file_path)?;
        let output = run_stages(&source_bytes, &source, spec, self.config.quality)?;
        let derived = self.persist(&source, output)?;

        let info = DerivedImageInfo::from(&derived);
        self.write_through(&key, &info);
        Ok(info)
    }

    /// Delete an image record along with its stored file.
    pub fn delete_image(&self, image_id: i64) -> Result<(), PipelineError> {
        let record = self
            .repository
            .find_by_id(image_id)?
            .ok_or(PipelineError::NotFound(image_id))?;
        self.repository.delete(image_id)?;
        self.store.remove(&record.file_path)?;
        Ok(())
    }

    /// Drop the memoized result for one `(source, spec)` pair. Failures are
    /// logged, never surfaced.
    pub fn invalidate_result(&self, image_id: i64, spec: &TransformationSpec) {
        let key = cache::transform_key(image_id, spec);
        if let Err(error) = self.cache.invalidate(&key) {
            tracing::warn!(%error, "result cache invalidation failed");
        }
    }

    /// Cache lookup with full degradation: backend errors and undecodable
    /// values are both treated as misses.
    fn cached_result(&self, key: &str) -> Option<DerivedImageInfo> {
        let value = match self.cache.get(key) {
            Ok(value) => value?,
            Err(error) => {
                tracing::warn!(%error, "result cache unavailable, recomputing");
                return None;
            }
        };
        match serde_json::from_str(&value) {
            Ok(info) => Some(info),
            Err(error) => {
                tracing::warn!(%error, "discarding undecodable cache entry");
                None
            }
        }
    }

    fn write_through(&self, key: &str, info: &DerivedImageInfo) {
        let value = match serde_json::to_string(info) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, "failed to serialize cache value");
                return;
            }
        };
        if let Err(error) = self.cache.set(key, &value, self.config.cache_ttl) {
            tracing::warn!(%error, "result cache write failed");
        }
    }

    /// Write the derived bytes and create the derived row. A row failure
    /// after the file write unwinds the partial artifact.
    fn persist(
        &self,
        source: &ImageRecord,
        output: StageOutput,
    ) -> Result<ImageRecord, PipelineError> {
        let storage_name = record::generate_storage_name(&output.filename);
        let file_path = record::derive_file_path(&storage_name, Utc::now());

        self.store.write(&file_path, &output.bytes)?;

        let created = self.repository.create(NewImage {
            filename: output.filename,
            storage_name,
            file_path: file_path.clone(),
            file_size: output.bytes.len() as u64,
            mime_type: output.mime_type,
            owner_id: source.owner_id,
        });

        match created {
            Ok(record) => Ok(record),
            Err(error) => {
                if let Err(cleanup) = self.store.remove(&file_path) {
                    tracing::warn!(%cleanup, %file_path, "failed to remove partial artifact");
                }
                Err(error.into())
            }
        }
    }
}

/// Apply the spec's operations in declared order, each stage consuming the
/// previous stage's output, then encode the final result once.
///
/// The empty spec is the identity transform: the source bytes pass through
/// untouched.
fn run_stages(
    source_bytes: &[u8],
    source: &ImageRecord,
    spec: &TransformationSpec,
    quality: Quality,
) -> Result<StageOutput, PipelineError> {
    if spec.is_empty() {
        return Ok(StageOutput {
            bytes: source_bytes.to_vec(),
            filename: source.filename.clone(),
            mime_type: source.mime_type.clone(),
        });
    }

    let mut img = ops::decode(source_bytes).map_err(|source| PipelineError::Operation {
        stage: "decode",
        source,
    })?;

    // Without a format operation, output re-encodes in the source's format.
    let mut format =
        OutputFormat::from_mime_type(&source.mime_type).unwrap_or(OutputFormat::Jpeg);
    let mut converted = false;
    let mut filename = source.filename.clone();

    for op in spec.operations() {
        match op {
            Operation::Resize { width, height } => {
                img = ops::resize(&img, *width, *height);
            }
            Operation::Crop {
                x,
                y,
                width,
                height,
            } => {
                img = ops::crop(&img, *x, *y, *width, *height).map_err(|source| {
                    PipelineError::Operation {
                        stage: "crop",
                        source,
                    }
                })?;
            }
            Operation::Rotate { direction } | Operation::Flip { direction } => {
                img = ops::mirror(&img, *direction);
            }
            Operation::Format { target } => {
                format = *target;
                converted = true;
            }
            Operation::Filters { grayscale, sepia } => {
                if *grayscale {
                    img = ops::grayscale(&img);
                }
                if *sepia {
                    img = ops::sepia(&img);
                }
            }
        }
        filename = format!("{}{}", op.filename_prefix(), filename);
    }

    if converted {
        filename = std::path::Path::new(&filename)
            .with_extension(format.extension())
            .to_string_lossy()
            .into_owned();
    }

    let bytes = ops::encode(&img, format, quality).map_err(|source| PipelineError::Operation {
        stage: "encode",
        source,
    })?;

    Ok(StageOutput {
        bytes,
        filename,
        mime_type: format.mime_type().to_string(),
    })
}
