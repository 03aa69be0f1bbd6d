//! The package transform pipeline.
//!
//! A run unpacks the input package into a scratch workspace, recovers the
//! application identifier, hands the extracted tree to a [`Transform`],
//! and repacks the transformed tree with the original compression methods
//! and entry paths. An optional [`NativeProtector`] then processes the
//! repacked Android archive.
//!
//! Stages run strictly in order. Scratch directories live in a
//! [`Workspace`] and disappear with it on every exit path.

mod native;
mod transform;
mod workspace;

pub use native::{NativeProtector, collect_mapping_files};
pub use transform::{Framework, ProcessTransform, Transform, TransformRequest, resolve_tool, run_tool};
pub use workspace::{Workspace, copy_tree};

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::archive::{pack, unpack};
use crate::manifest::info_plist::{self, PlistFormat};
use crate::manifest::recover_package_id;
use crate::package::{PackageKind, find_app_bundle};
use crate::{Error, Result};

/// Everything a run needs besides the transform itself
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub input: PathBuf,
    /// Defaults to a name derived from the input, next to it
    pub output: Option<PathBuf>,
    pub blueprint: Option<PathBuf>,
    pub framework: Option<Framework>,
    pub native: Option<NativeProtector>,
    /// Defaults to `<output stem>_protection_output` next to the output
    pub native_output: Option<PathBuf>,
    /// Parent of the scratch workspace; the system temp dir when unset
    pub work_dir: Option<PathBuf>,
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub kind: PackageKind,
    pub package_id: Option<String>,
    /// The repacked archive, or the native protector's output directory
    pub output: PathBuf,
    pub mapping_files: Vec<PathBuf>,
}

/// Subdirectory of the transform root that gets repacked. It does not exist
/// until the transform (or the AAB copy) creates it.
const OUT_DIR: &str = "out";

/// Directories the transform reads, writes, and the tree that gets repacked
#[derive(Debug)]
struct Layout {
    input: PathBuf,
    output: PathBuf,
    pack_root: PathBuf,
}

pub struct Pipeline<T: Transform> {
    config: PipelineConfig,
    transform: T,
}

impl<T: Transform> Pipeline<T> {
    pub fn new(config: PipelineConfig, transform: T) -> Self {
        Self { config, transform }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage.
    ///
    /// # Errors
    ///
    /// Archive, transform and I/O failures abort the run and leave nothing
    /// at the output path. Manifest decoding failures only drop the
    /// application identifier.
    pub async fn run(&self) -> Result<PipelineOutcome> {
        let input = &self.config.input;
        let kind = PackageKind::from_path(input)?;
        if !fs::metadata(input).await.is_ok_and(|m| m.is_file()) {
            return Err(Error::Config(format!("{} does not exist", input.display())));
        }
        let output = self
            .config
            .output
            .clone()
            .unwrap_or_else(|| kind.default_output(input));

        let workspace = Workspace::new(self.config.work_dir.as_deref())?;

        info!("Extracting {kind} {}", input.display());
        let report = unpack(input, Some(workspace.extract_root())).await?;
        info!(
            "Extracted {} entries ({} renamed)",
            report.compression.len(),
            report.renames.len()
        );

        let package_id = self.package_id(kind, workspace.extract_root()).await?;
        let layout = self.layout(kind, &workspace).await?;

        if kind == PackageKind::Ipa {
            convert_plist(&layout.input, PlistFormat::Xml).await;
        }

        info!("Protecting with {}", self.transform.name());
        let request = TransformRequest {
            package_id: package_id.clone(),
            blueprint: self.config.blueprint.clone(),
            input: layout.input.clone(),
            output: layout.output.clone(),
            target: self.config.framework.map(|f| f.target(kind.platform())),
        };
        self.transform.run(&request).await?;
        if !fs::try_exists(&layout.output).await? {
            return Err(Error::ExternalTransformFailure {
                tool: self.transform.name().to_string(),
                reason: format!("no output at {}", layout.output.display()),
            });
        }

        if kind == PackageKind::Ipa {
            convert_plist(&layout.output, PlistFormat::Binary).await;
        }

        let outcome = match self.config.native.as_ref().filter(|_| kind.is_android()) {
            Some(native) => {
                let file_name = output
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(format!("package.{}", kind.extension())));
                let intermediate = workspace.staging_dir().join(file_name);
                info!("Repacking into {}", intermediate.display());
                pack(&layout.pack_root, &intermediate, &report.compression, &report.renames)
                    .await?;

                let out_dir = self
                    .config
                    .native_output
                    .clone()
                    .unwrap_or_else(|| native_output_dir(&output));
                info!("Protecting native code into {}", out_dir.display());
                let scratch = workspace.staging_dir().join("native");
                fs::create_dir_all(&scratch).await?;
                let mapping_files = native.protect(&intermediate, &out_dir, &scratch).await?;
                PipelineOutcome {
                    kind,
                    package_id,
                    output: out_dir,
                    mapping_files,
                }
            }
            None => {
                if self.config.native.is_some() {
                    warn!("Native protection only applies to Android packages, skipping");
                }
                info!("Repacking into {}", output.display());
                pack(&layout.pack_root, &output, &report.compression, &report.renames).await?;
                PipelineOutcome {
                    kind,
                    package_id,
                    output,
                    mapping_files: Vec::new(),
                }
            }
        };

        info!("Cleaning up");
        workspace.close()?;
        Ok(outcome)
    }

    async fn package_id(&self, kind: PackageKind, extracted_root: &Path) -> Result<Option<String>> {
        match recover_package_id(kind, extracted_root).await {
            Ok(Some(id)) => {
                info!("Package id: {id}");
                Ok(Some(id))
            }
            Ok(None) => {
                warn!("No package id found in the {kind} manifest");
                Ok(None)
            }
            Err(e) if e.is_recoverable() || matches!(e, Error::Plist(_)) => {
                warn!("Could not read the package id: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Everything the transform writes lands below `<transform root>/out`.
    /// The output directory itself does not exist yet, except for AAB where
    /// the whole tree is copied into `out` first.
    async fn layout(&self, kind: PackageKind, workspace: &Workspace) -> Result<Layout> {
        let extract = workspace.extract_root();
        let out = workspace.transform_root().join(OUT_DIR);
        let layout = match kind {
            PackageKind::Apk => Layout {
                input: extract.to_path_buf(),
                output: out.clone(),
                pack_root: out,
            },
            PackageKind::Aab => {
                let (from, to) = (extract.to_path_buf(), out.clone());
                tokio::task::spawn_blocking(move || copy_tree(&from, &to))
                    .await
                    .map_err(io::Error::other)??;
                Layout {
                    input: extract.join("base"),
                    output: out.join("base"),
                    pack_root: out,
                }
            }
            PackageKind::Ipa => match find_app_bundle(extract).await? {
                Some(bundle) => {
                    let output = out.join(&bundle);
                    if let Some(parent) = output.parent() {
                        fs::create_dir_all(parent).await?;
                    }
                    Layout {
                        input: extract.join(&bundle),
                        output,
                        pack_root: out,
                    }
                }
                None => {
                    warn!("No Payload/*.app bundle found, transforming the whole archive");
                    Layout {
                        input: extract.to_path_buf(),
                        output: out.clone(),
                        pack_root: out,
                    }
                }
            },
        };
        Ok(layout)
    }
}

/// `<output stem>_protection_output` next to `output`
pub fn native_output_dir(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
    output.with_file_name(format!("{stem}_protection_output"))
}

async fn convert_plist(app_dir: &Path, format: PlistFormat) {
    match info_plist::convert(app_dir, format).await {
        Ok(true) => {}
        Ok(false) => warn!("No {} in {}", info_plist::INFO_PLIST, app_dir.display()),
        Err(e) => warn!("Could not convert {} to {format:?}: {e}", info_plist::INFO_PLIST),
    }
}
