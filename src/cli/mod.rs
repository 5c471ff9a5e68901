//! Command-line interface

pub mod output;

use crate::core::{
    config::USE_REGISTRY, Arch, BuildLayout, ExtractorPath, Extractors, PipelineConfig, Step,
    StepSelection,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Staged build orchestrator
#[derive(Debug, Parser, Clone)]
#[command(name = "stagebuild")]
#[command(version)]
#[command(about = "Prepares, configures, builds and packages a browser source tree", long_about = None)]
pub struct Cli {
    /// Run in CI mode: one step per invocation, resumable through completion markers
    #[arg(long)]
    pub ci: bool,

    /// Build for 32-bit x86 instead of x64
    #[arg(long)]
    pub x86: bool,

    /// 7-Zip binary, or `_use_registry` to look it up
    #[arg(long = "7z-path", value_name = "PATH", default_value = USE_REGISTRY)]
    pub seven_zip_path: ExtractorPath,

    /// WinRAR binary, or `_use_registry` to look it up
    #[arg(long, value_name = "PATH", default_value = USE_REGISTRY)]
    pub winrar_path: ExtractorPath,

    /// Disable TLS certificate verification for downloads
    #[arg(long)]
    pub disable_ssl_verification: bool,

    /// Step to run in CI mode
    #[arg(long, value_enum, default_value_t = Step::SetupEnvironment)]
    pub step: Step,

    /// Run the CI step even if its completion marker exists
    #[arg(long)]
    pub force: bool,

    /// Leave vendor domains in the source tree untouched
    #[arg(long)]
    pub skip_domain_substitution: bool,

    /// YAML file overriding the build layout
    #[arg(long, value_name = "FILE")]
    pub layout: Option<PathBuf>,

    /// Checkout root (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Toolchain setup script to use instead of locating Visual Studio
    #[arg(long, value_name = "PATH")]
    pub toolchain_script: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Checkout root the layout resolves against
    pub fn root_dir(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("Failed to read the current directory"),
        }
    }

    /// Load the layout file, or the default layout, resolved against the root
    pub fn load_layout(&self) -> Result<BuildLayout> {
        let layout = match &self.layout {
            Some(path) => BuildLayout::from_file(path)
                .with_context(|| format!("Failed to load layout {}", path.display()))?,
            None => BuildLayout::default(),
        };
        Ok(layout.resolve(self.root_dir()?))
    }

    /// Configuration for the run, fixed from here on
    pub fn pipeline_config(&self, layout: BuildLayout) -> PipelineConfig {
        PipelineConfig {
            selection: StepSelection::resolve(self.ci, self.step),
            force: self.force,
            ci: self.ci,
            arch: if self.x86 { Arch::X86 } else { Arch::X64 },
            extractors: Extractors {
                seven_zip: self.seven_zip_path.clone(),
                winrar: self.winrar_path.clone(),
            },
            ssl_verification: !self.disable_ssl_verification,
            skip_domain_substitution: self.skip_domain_substitution,
            layout,
        }
    }
}
