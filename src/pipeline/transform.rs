//! The external protection transform and the processes that run it.

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// Hybrid application framework the transform should target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    ReactNative,
    NativeScript,
    Cordova,
    Ionic,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::ReactNative => "reactnative",
            Framework::NativeScript => "nativescript",
            Framework::Cordova => "cordova",
            Framework::Ionic => "ionic",
        }
    }

    /// Target-type flag value, e.g. `cordova-android`
    pub fn target(&self, platform: &str) -> String {
        format!("{}-{platform}", self.as_str())
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of the transform
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub package_id: Option<String>,
    pub blueprint: Option<PathBuf>,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Value of the target-type flag
    pub target: Option<String>,
}

/// Opaque tool that rewrites an extracted package tree.
///
/// Reads `request.input`, writes `request.output`, and succeeds or fails
/// as a whole.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    async fn run(&self, request: &TransformRequest) -> Result<()>;
}

/// Runs the transform as a child process
#[derive(Debug, Clone)]
pub struct ProcessTransform {
    program: PathBuf,
    timeout: Option<Duration>,
    name: String,
}

impl ProcessTransform {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = tool_name(&program);
        Self {
            program,
            timeout: None,
            name,
        }
    }

    /// Kill the child and fail when it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `[-id <package>] [-b <blueprint>] -i <input> -o <output> [-t <target>]`
    pub fn args(request: &TransformRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(id) = &request.package_id {
            args.push("-id".into());
            args.push(id.into());
        }
        if let Some(blueprint) = &request.blueprint {
            args.push("-b".into());
            args.push(blueprint.into());
        }
        args.push("-i".into());
        args.push(request.input.clone().into());
        args.push("-o".into());
        args.push(request.output.clone().into());
        if let Some(target) = &request.target {
            args.push("-t".into());
            args.push(target.into());
        }
        args
    }
}

#[async_trait]
impl Transform for ProcessTransform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, request: &TransformRequest) -> Result<()> {
        run_tool(&self.program, &Self::args(request), None, self.timeout).await
    }
}

/// Run `program` to completion with inherited stdout and stderr.
///
/// A non-zero exit, a failed spawn, or an expired timeout are all
/// [`Error::ExternalTransformFailure`].
pub async fn run_tool(
    program: &Path,
    args: &[OsString],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<()> {
    let tool = tool_name(program);
    let failure = |reason: String| Error::ExternalTransformFailure {
        tool: tool.clone(),
        reason,
    };

    debug!("Running {} {:?}", program.display(), args);
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null()).kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    let mut child = command
        .spawn()
        .map_err(|e| failure(format!("could not start {}: {e}", program.display())))?;

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                info!("{tool} exceeded {limit:?}, stopping it");
                child.kill().await?;
                return Err(failure(format!("timed out after {limit:?}")));
            }
        },
        None => child.wait().await?,
    };

    if !status.success() {
        let reason = match status.code() {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by a signal".to_string(),
        };
        return Err(failure(reason));
    }
    Ok(())
}

/// Resolve a tool given on the command line.
///
/// A bare name is searched on `PATH`; anything with a directory part must
/// name an existing file.
pub fn resolve_tool(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        if program.is_file() {
            return Ok(program.to_path_buf());
        }
        return Err(Error::Config(format!("{} does not exist", program.display())));
    }

    let path = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Ok(candidate);
        }
        #[cfg(windows)]
        {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Ok(exe);
            }
        }
    }
    Err(Error::Config(format!(
        "{} was not found on PATH",
        program.display()
    )))
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TransformRequest {
        TransformRequest {
            package_id: None,
            blueprint: None,
            input: PathBuf::from("/in"),
            output: PathBuf::from("/out"),
            target: None,
        }
    }

    #[test]
    fn minimal_args() {
        assert_eq!(
            ProcessTransform::args(&request()),
            ["-i", "/in", "-o", "/out"].map(OsString::from)
        );
    }

    #[test]
    fn full_args_keep_flag_order() {
        let request = TransformRequest {
            package_id: Some("com.example.app".to_string()),
            blueprint: Some(PathBuf::from("bp.json")),
            target: Some(Framework::Cordova.target("android")),
            ..request()
        };
        assert_eq!(
            ProcessTransform::args(&request),
            [
                "-id", "com.example.app", "-b", "bp.json", "-i", "/in", "-o", "/out", "-t",
                "cordova-android",
            ]
            .map(OsString::from)
        );
    }

    #[test]
    fn framework_targets() {
        assert_eq!(Framework::ReactNative.target("ios"), "reactnative-ios");
        assert_eq!(Framework::NativeScript.target("android"), "nativescript-android");
        assert_eq!(Framework::Ionic.to_string(), "ionic");
    }

    #[test]
    fn missing_explicit_tool_is_a_config_error() {
        let err = resolve_tool(Path::new("./definitely/not/here")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = resolve_tool(Path::new("hybridpack-no-such-tool-on-path")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(unix)]
    #[test]
    fn resolves_bare_names_on_path() {
        let sh = resolve_tool(Path::new("sh")).unwrap();
        assert!(sh.is_absolute());
        assert!(sh.ends_with("sh"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_transform_failure() {
        let err = run_tool(Path::new("false"), &[], None, None).await.unwrap_err();
        match err {
            Error::ExternalTransformFailure { tool, reason } => {
                assert_eq!(tool, "false");
                assert!(reason.contains("status 1"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        run_tool(Path::new("true"), &[], None, None).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tools_are_killed() {
        let err = run_tool(
            Path::new("sleep"),
            &[OsString::from("5")],
            None,
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ExternalTransformFailure { .. }));
    }

    #[tokio::test]
    async fn unknown_program_is_a_transform_failure() {
        let err = run_tool(Path::new("/nonexistent/hybridpack-tool"), &[], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalTransformFailure { .. }));
    }
}
