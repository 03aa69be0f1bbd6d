//! # hybridpack
//!
//! Runs an external protection transform over mobile app packages.
//!
//! APK, AAB and IPA files are ZIP containers. This library unpacks them
//! safely on any file system, recovers the application identifier straight
//! from the compiled manifest, hands the extracted tree to a transform, and
//! repacks the result with the original entry paths and compression methods.
//!
//! ## Features
//!
//! - ZIP reading through the Central Directory, ZIP64 aware
//! - Case-insensitive collision renaming that round-trips exactly
//! - Package id recovery from binary XML, protobuf and `Info.plist` manifests
//! - Temporary workspaces that are always cleaned up
//!
//! ## Example
//!
//! ```no_run
//! use hybridpack::{Pipeline, PipelineConfig, ProcessTransform};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig {
//!         input: "app.apk".into(),
//!         ..PipelineConfig::default()
//!     };
//!     let transform = ProcessTransform::new("protect-hybrid-js");
//!
//!     let outcome = Pipeline::new(config, transform).run().await?;
//!     println!("{}", outcome.output.display());
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod error;
pub mod io;
pub mod manifest;
pub mod package;
pub mod pipeline;
pub mod zip;

pub use archive::{CompressionTable, RenameTable, UnpackReport, pack, unpack};
pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{LocalFileReader, ReadAt};
pub use package::PackageKind;
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutcome, ProcessTransform, Transform};
pub use crate::zip::{ZipExtractor, ZipFileEntry};
