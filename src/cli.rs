use clap::{ArgGroup, Parser};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

use crate::Result;
use crate::pipeline::{Framework, NativeProtector, PipelineConfig, ProcessTransform, resolve_tool};

/// Transform tool looked up on `PATH` when `--transform` is not given
pub const DEFAULT_TRANSFORM: &str = "protect-hybrid-js";

#[derive(Parser, Debug)]
#[command(name = "hybridpack")]
#[command(version)]
#[command(about = "Protect hybrid app packages (APK, AAB, IPA) with an external transform", long_about = None)]
#[command(group(ArgGroup::new("framework").args(["reactnative", "nativescript", "cordova", "ionic"])))]
#[command(after_help = "Examples:\n  \
  hybridpack app.apk --cordova                 writes app.protected.unsigned.apk\n  \
  hybridpack App.ipa --ionic -b blueprint.json writes App-protected.ipa\n  \
  hybridpack app.aab -o out.aab --native-protector protect-native")]
pub struct Cli {
    /// Package to protect (.apk, .aab or .ipa)
    #[arg(value_name = "PACKAGE")]
    pub input: PathBuf,

    /// Output package path
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Transform tool (path, or name searched on PATH)
    #[arg(short = 't', long, value_name = "TOOL", default_value = DEFAULT_TRANSFORM)]
    pub transform: PathBuf,

    /// Blueprint handed to the transform
    #[arg(short = 'b', long, value_name = "FILE")]
    pub blueprint: Option<PathBuf>,

    /// Target a React Native app
    #[arg(long)]
    pub reactnative: bool,

    /// Target a NativeScript app
    #[arg(long)]
    pub nativescript: bool,

    /// Target a Cordova app
    #[arg(long)]
    pub cordova: bool,

    /// Target an Ionic app
    #[arg(long)]
    pub ionic: bool,

    /// Kill the transform after this many seconds
    #[arg(long, value_name = "SECS")]
    pub transform_timeout: Option<u64>,

    /// Native protector run on the repacked Android package
    #[arg(long, value_name = "TOOL")]
    pub native_protector: Option<PathBuf>,

    /// Blueprint handed to the native protector
    #[arg(long, value_name = "FILE", requires = "native_protector")]
    pub native_blueprint: Option<PathBuf>,

    /// More output (-vv for trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Less output (-qq for errors only)
    #[arg(short = 'q', action = clap::ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,
}

impl Cli {
    pub fn framework(&self) -> Option<Framework> {
        if self.reactnative {
            Some(Framework::ReactNative)
        } else if self.nativescript {
            Some(Framework::NativeScript)
        } else if self.cordova {
            Some(Framework::Cordova)
        } else if self.ionic {
            Some(Framework::Ionic)
        } else {
            None
        }
    }

    /// Log level selected by `-v` / `-q`
    pub fn log_level(&self) -> Level {
        match (self.verbose, self.quiet) {
            (0, 0) => Level::INFO,
            (1, _) => Level::DEBUG,
            (v, _) if v > 1 => Level::TRACE,
            (_, 1) => Level::WARN,
            _ => Level::ERROR,
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.transform_timeout.map(Duration::from_secs)
    }

    /// The configured transform, with its tool resolved.
    pub fn transform(&self) -> Result<ProcessTransform> {
        Ok(ProcessTransform::new(resolve_tool(&self.transform)?).with_timeout(self.timeout()))
    }

    /// Pipeline settings, with every path made absolute.
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let native = match &self.native_protector {
            Some(program) => Some(NativeProtector {
                program: resolve_tool(program)?,
                blueprint: self.native_blueprint.as_deref().map(absolute).transpose()?,
                timeout: self.timeout(),
            }),
            None => None,
        };

        Ok(PipelineConfig {
            input: absolute(&self.input)?,
            output: self.output.as_deref().map(absolute).transpose()?,
            blueprint: self.blueprint.as_deref().map(absolute).transpose()?,
            framework: self.framework(),
            native,
            native_output: None,
            work_dir: None,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("hybridpack").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&["app.apk"]);
        assert_eq!(cli.transform, PathBuf::from(DEFAULT_TRANSFORM));
        assert_eq!(cli.framework(), None);
        assert_eq!(cli.log_level(), Level::INFO);
        assert_eq!(cli.timeout(), None);
    }

    #[test]
    fn framework_flags_are_exclusive() {
        assert_eq!(parse(&["a.ipa", "--ionic"]).framework(), Some(Framework::Ionic));
        assert!(Cli::try_parse_from(["hybridpack", "a.apk", "--cordova", "--ionic"]).is_err());
    }

    #[test]
    fn verbosity() {
        assert_eq!(parse(&["a.apk", "-v"]).log_level(), Level::DEBUG);
        assert_eq!(parse(&["a.apk", "-vv"]).log_level(), Level::TRACE);
        assert_eq!(parse(&["a.apk", "-q"]).log_level(), Level::WARN);
        assert_eq!(parse(&["a.apk", "-qq"]).log_level(), Level::ERROR);
        assert!(Cli::try_parse_from(["hybridpack", "a.apk", "-v", "-q"]).is_err());
    }

    #[test]
    fn native_blueprint_needs_a_protector() {
        assert!(Cli::try_parse_from(["hybridpack", "a.apk", "--native-blueprint", "b.json"]).is_err());
    }

    #[test]
    fn config_paths_are_absolute() {
        let cli = parse(&["app.apk", "-o", "out/app.apk", "-b", "bp.json", "--cordova"]);
        let config = cli.to_config().unwrap();
        assert!(config.input.is_absolute());
        assert!(config.output.unwrap().is_absolute());
        assert!(config.blueprint.unwrap().is_absolute());
        assert_eq!(config.framework, Some(Framework::Cordova));
        assert!(config.native.is_none());
    }

    #[test]
    fn missing_tool_fails_validation() {
        let cli = parse(&["app.apk", "-t", "./no/such/protector"]);
        assert!(cli.transform().is_err());
    }
}
