//! # Darkroom
//!
//! An image transformation pipeline core with memoized results. An
//! authenticated owner submits a declarative set of image operations
//! (resize, crop, rotate, flip, format conversion, filters) against a
//! previously stored image; the pipeline validates the request, applies the
//! operations in order, and produces a new derived image record —
//! memoizing the outcome so identical requests are never recomputed.
//!
//! # Architecture: Validate → Execute → Persist → Memoize
//!
//! ```text
//! 1. Validate   raw request  →  TransformationSpec   (typed, or rejected)
//! 2. Execute    spec         →  derived bytes        (cache consulted first)
//! 3. Persist    bytes        →  new ImageRecord      (source left untouched)
//! 4. Memoize    metadata     →  ResultCache          (24h TTL write-through)
//! ```
//!
//! This separation exists for three reasons:
//!
//! - **Safety**: validation rejects malformed specs before any resource is
//!   touched, and failed runs unwind their partial artifacts.
//! - **Idempotence**: repeating a request inside the TTL performs file I/O
//!   exactly once; cache keys are canonical, so incidental request key
//!   ordering never splits the cache.
//! - **Testability**: the operation library is pure, and every collaborator
//!   (repository, file store, cache) is a trait that tests replace with
//!   recording mocks.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`spec`] | Request validation and canonicalization into a typed [`spec::TransformationSpec`] |
//! | [`imaging`] | Operation vocabulary and pure pixel operations: resize, crop, mirror, filters, encode |
//! | [`pipeline`] | Sequential stage execution, persistence, cleanup, structured failures |
//! | [`cache`] | Result memoization: SHA-256 keys, TTL entries, graceful degradation |
//! | [`record`] | Image metadata model, storage naming, path derivation |
//! | [`repository`] | Metadata persistence seam (`ImageRepository` trait + in-memory impl) |
//! | [`store`] | Binary storage seam (`FileStore` trait + local filesystem impl) |
//!
//! # Design Decisions
//!
//! ## Sequential Chaining
//!
//! Operations compose: each stage consumes the previous stage's output, so
//! `crop` then `resize` crops first and resizes the cropped region. Pixels
//! are decoded once at the head of the chain and encoded once at the tail —
//! a `format` operation changes the target encoding rather than forcing an
//! intermediate re-encode.
//!
//! ## New Row Per Derived Image
//!
//! A transformation never mutates the source record or its file. Every
//! successful run creates a fresh record with its own UUID storage name and
//! the same owner, making derived images first-class, independently
//! deletable artifacts.
//!
//! ## Metadata-Only Memoization
//!
//! The cache stores serialized result *metadata*, not pixels. The derived
//! file is written exactly once per unique `(source, canonical spec)` pair;
//! cache hits return the stored metadata without touching the repository or
//! the file store. A cache backend failure is logged and degrades to
//! recompute — it can never fail a request.
//!
//! ## Rotate Means Mirror
//!
//! Both `rotate` and `flip` produce a mirror transform (`horizontal` =
//! left-right, anything else = top-bottom). That is the documented contract
//! carried over from the system this replaces; renaming awaits a product
//! decision.

pub mod cache;
pub mod imaging;
pub mod pipeline;
pub mod record;
pub mod repository;
pub mod spec;
pub mod store;

pub use cache::{InMemoryCache, ResultCache};
pub use pipeline::{Failure, Pipeline, PipelineConfig, PipelineError, StatusClass};
pub use record::{DerivedImageInfo, ImageRecord};
pub use repository::{ImageRepository, InMemoryRepository};
pub use spec::TransformationSpec;
pub use store::{FileStore, LocalFileStore};
