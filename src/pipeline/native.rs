use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

use super::transform::run_tool;
use crate::Result;

/// Marker in the names of guard-mapping files the native protector writes
const MAPPING_MARKER: &str = "AppAware";

/// Second-stage protector for the native code of a repacked Android archive
#[derive(Debug, Clone)]
pub struct NativeProtector {
    pub program: PathBuf,
    pub blueprint: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl NativeProtector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            blueprint: None,
            timeout: None,
        }
    }

    /// `--input <archive> --output <dir> [--blueprint <path>]`
    pub fn args(&self, archive: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--input".into(),
            archive.into(),
            "--output".into(),
            output_dir.into(),
        ];
        if let Some(blueprint) = &self.blueprint {
            args.push("--blueprint".into());
            args.push(blueprint.into());
        }
        args
    }

    /// Protect `archive` into `output_dir`, running the tool inside
    /// `scratch_dir`, then move the guard-mapping files it left there into
    /// `output_dir`.
    ///
    /// Returns the moved mapping files.
    pub async fn protect(
        &self,
        archive: &Path,
        output_dir: &Path,
        scratch_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir).await?;
        run_tool(
            &self.program,
            &self.args(archive, output_dir),
            Some(scratch_dir),
            self.timeout,
        )
        .await?;
        collect_mapping_files(scratch_dir, output_dir).await
    }
}

/// Move every `*AppAware*.json` file from `from` into `to`.
pub async fn collect_mapping_files(from: &Path, to: &Path) -> Result<Vec<PathBuf>> {
    let mut moved = Vec::new();
    let mut entries = fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.contains(MAPPING_MARKER) && name.ends_with(".json")) {
            continue;
        }
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let target = to.join(entry.file_name());
        if fs::rename(entry.path(), &target).await.is_err() {
            // rename cannot cross file systems
            fs::copy(entry.path(), &target).await?;
            fs::remove_file(entry.path()).await?;
        }
        debug!("Moved {} to {}", name, to.display());
        moved.push(target);
    }
    moved.sort();
    if !moved.is_empty() {
        info!("{} guard mapping file(s) saved to {}", moved.len(), to.display());
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_include_blueprint_only_when_set() {
        let mut protector = NativeProtector::new("protect-native");
        let args = protector.args(Path::new("a.apk"), Path::new("out"));
        assert_eq!(args, ["--input", "a.apk", "--output", "out"].map(OsString::from));

        protector.blueprint = Some(PathBuf::from("bp.json"));
        let args = protector.args(Path::new("a.apk"), Path::new("out"));
        assert_eq!(args.len(), 6);
        assert_eq!(args[4], "--blueprint");
    }

    #[tokio::test]
    async fn moves_only_mapping_json_files() {
        let from = tempfile::tempdir().unwrap();
        let to = tempfile::tempdir().unwrap();
        std::fs::write(from.path().join("com.demo_AppAware_map.json"), b"{}").unwrap();
        std::fs::write(from.path().join("AppAware.txt"), b"no").unwrap();
        std::fs::write(from.path().join("other.json"), b"{}").unwrap();

        let moved = collect_mapping_files(from.path(), to.path()).await.unwrap();
        assert_eq!(moved, [to.path().join("com.demo_AppAware_map.json")]);
        assert!(!from.path().join("com.demo_AppAware_map.json").exists());
        assert!(from.path().join("other.json").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn protect_runs_the_tool_in_the_scratch_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("protector.sh");
        std::fs::write(
            &tool,
            "#!/bin/sh\necho '{}' > guard_AppAware.json\ntouch \"$4/protected.apk\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        let out = dir.path().join("out");
        let moved = NativeProtector::new(&tool)
            .protect(Path::new("in.apk"), &out, &scratch)
            .await
            .unwrap();

        assert_eq!(moved, [out.join("guard_AppAware.json")]);
        assert!(out.join("protected.apk").exists());
    }
}
