//! Build layout (YAML) and resolved pipeline configuration

use crate::core::Step;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Sentinel extractor path meaning "look the binary up in the system registry"
pub const USE_REGISTRY: &str = "_use_registry";

/// Directory and tool layout of a build checkout
///
/// Root-relative paths are joined onto the root by [`BuildLayout::resolve`].
/// Paths documented as source-relative stay relative, since build commands
/// run with the source tree as their working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildLayout {
    /// Launch root; set by `resolve`, never read from YAML
    #[serde(skip)]
    pub root: PathBuf,

    /// Extracted source tree
    pub source_tree: PathBuf,

    /// Cache for downloaded archives
    pub download_cache: PathBuf,

    /// Download manifests, read in order
    pub download_manifests: Vec<PathBuf>,

    /// List of binary paths to prune from the source tree
    pub pruning_list: PathBuf,

    /// Patch series directories, applied in order
    pub patch_series: Vec<PathBuf>,

    /// Patch binary bundled with the source tree (source-relative)
    pub patch_binary: PathBuf,

    /// Domain substitution regex list
    pub domain_regex_list: PathBuf,

    /// List of files domain substitution applies to
    pub domain_substitution_list: PathBuf,

    /// Base GN flags shared by all platforms
    pub base_flags: PathBuf,

    /// Platform GN flags appended after the base flags
    pub platform_flags: PathBuf,

    /// Build output directory (source-relative)
    pub output_dir: PathBuf,

    /// GN binary produced by bootstrap (source-relative)
    pub gn_binary: PathBuf,

    /// GN bootstrap script (source-relative)
    pub gn_bootstrap_script: PathBuf,

    /// Ninja binary (source-relative)
    pub ninja_binary: PathBuf,

    /// Python interpreter used for bootstrap and utility scripts
    pub python: String,

    /// Directory holding the source-preparation utility scripts
    pub utils_dir: PathBuf,

    /// Packaging script, run from the root
    pub package_script: PathBuf,

    /// Build targets passed to ninja
    pub build_targets: Vec<String>,

    /// Deadline for the build step in CI mode (in seconds)
    pub ci_build_timeout_secs: u64,

    /// Bucket the PGO profiles are fetched from
    pub pgo_profile_url: String,
}

impl Default for BuildLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            source_tree: PathBuf::from("build/src"),
            download_cache: PathBuf::from("build/download_cache"),
            download_manifests: vec![
                PathBuf::from("downloads.ini"),
                PathBuf::from("ungoogled-chromium/downloads.ini"),
            ],
            pruning_list: PathBuf::from("ungoogled-chromium/pruning.list"),
            patch_series: vec![
                PathBuf::from("ungoogled-chromium/patches"),
                PathBuf::from("patches"),
            ],
            patch_binary: PathBuf::from("third_party/git/usr/bin/patch.exe"),
            domain_regex_list: PathBuf::from("ungoogled-chromium/domain_regex.list"),
            domain_substitution_list: PathBuf::from(
                "ungoogled-chromium/domain_substitution.list",
            ),
            base_flags: PathBuf::from("ungoogled-chromium/flags.gn"),
            platform_flags: PathBuf::from("flags.windows.gn"),
            output_dir: PathBuf::from("out/Default"),
            gn_binary: PathBuf::from("out/Default/gn.exe"),
            gn_bootstrap_script: PathBuf::from("tools/gn/bootstrap/bootstrap.py"),
            ninja_binary: PathBuf::from("third_party/ninja/ninja.exe"),
            python: "python".to_string(),
            utils_dir: PathBuf::from("ungoogled-chromium/utils"),
            package_script: PathBuf::from("package.py"),
            build_targets: vec![
                "chrome".to_string(),
                "chromedriver".to_string(),
                "mini_installer".to_string(),
            ],
            // 3.5 hours
            ci_build_timeout_secs: 12_600,
            pgo_profile_url:
                "https://commondatastorage.googleapis.com/chromium-optimization-profiles/pgo_profiles"
                    .to_string(),
        }
    }
}

impl BuildLayout {
    /// Load a layout from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a layout from a YAML string; missing keys keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let layout: BuildLayout = serde_yaml::from_str(yaml)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Validate the layout
    pub fn validate(&self) -> Result<()> {
        if self.build_targets.is_empty() {
            anyhow::bail!("build_targets must name at least one target");
        }
        if self.ci_build_timeout_secs == 0 {
            anyhow::bail!("ci_build_timeout_secs must be greater than zero");
        }
        if self.download_manifests.is_empty() {
            anyhow::bail!("download_manifests must list at least one manifest");
        }
        if self.python.trim().is_empty() {
            anyhow::bail!("python must name an interpreter");
        }
        for (name, path) in [
            ("output_dir", &self.output_dir),
            ("gn_binary", &self.gn_binary),
            ("ninja_binary", &self.ninja_binary),
            ("patch_binary", &self.patch_binary),
        ] {
            if path.is_absolute() {
                anyhow::bail!("{} must be relative to the source tree: {}", name, path.display());
            }
        }
        Ok(())
    }

    /// Join every root-relative path onto `root`
    pub fn resolve(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.source_tree = root.join(&self.source_tree);
        self.download_cache = root.join(&self.download_cache);
        self.download_manifests = self
            .download_manifests
            .iter()
            .map(|p| root.join(p))
            .collect();
        self.pruning_list = root.join(&self.pruning_list);
        self.patch_series = self.patch_series.iter().map(|p| root.join(p)).collect();
        self.domain_regex_list = root.join(&self.domain_regex_list);
        self.domain_substitution_list = root.join(&self.domain_substitution_list);
        self.base_flags = root.join(&self.base_flags);
        self.platform_flags = root.join(&self.platform_flags);
        self.utils_dir = root.join(&self.utils_dir);
        self.package_script = root.join(&self.package_script);
        self.root = root;
        self
    }

    /// Generated GN configuration file
    pub fn args_gn_path(&self) -> PathBuf {
        self.source_tree.join(&self.output_dir).join("args.gn")
    }

    /// GN binary inside the source tree
    pub fn gn_binary_path(&self) -> PathBuf {
        self.source_tree.join(&self.gn_binary)
    }

    /// Build step deadline used in CI mode
    pub fn ci_build_timeout(&self) -> Duration {
        Duration::from_secs(self.ci_build_timeout_secs)
    }
}

/// Target CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Arch {
    #[default]
    X64,
    X86,
}

impl Arch {
    /// Architecture token as it appears in GN flag files
    pub fn gn_token(self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::X86 => "x86",
        }
    }

    /// PGO profile target name
    pub fn pgo_target(self) -> &'static str {
        match self {
            Arch::X64 => "win64",
            Arch::X86 => "win32",
        }
    }

    /// Architecture name understood by the packaging script
    pub fn package_arch(self) -> &'static str {
        match self {
            Arch::X64 => "64bit",
            Arch::X86 => "32bit",
        }
    }
}

/// Location of an archive extractor binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorPath {
    /// Look the binary up in the system registry
    Registry,
    /// Explicit command or path
    Path(PathBuf),
}

impl FromStr for ExtractorPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == USE_REGISTRY {
            Ok(ExtractorPath::Registry)
        } else {
            Ok(ExtractorPath::Path(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for ExtractorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractorPath::Registry => f.write_str(USE_REGISTRY),
            ExtractorPath::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Extractor binaries keyed by archive kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extractors {
    pub seven_zip: ExtractorPath,
    pub winrar: ExtractorPath,
}

impl Default for Extractors {
    fn default() -> Self {
        Self {
            seven_zip: ExtractorPath::Registry,
            winrar: ExtractorPath::Registry,
        }
    }
}

/// Which steps a run considers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSelection {
    /// Every step, in order (local runs)
    All,
    /// A single step (CI runs, one invocation per step)
    Only(Step),
}

impl StepSelection {
    /// CI invokes the tool once per step; local runs do the whole pipeline
    pub fn resolve(ci: bool, step: Step) -> Self {
        if ci {
            StepSelection::Only(step)
        } else {
            StepSelection::All
        }
    }
}

/// Configuration resolved once at startup and fixed for the whole run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub selection: StepSelection,
    pub force: bool,
    pub ci: bool,
    pub arch: Arch,
    pub extractors: Extractors,
    pub ssl_verification: bool,
    pub skip_domain_substitution: bool,
    pub layout: BuildLayout,
}

impl PipelineConfig {
    /// Local-mode configuration over a resolved layout
    pub fn new(layout: BuildLayout) -> Self {
        Self {
            selection: StepSelection::All,
            force: false,
            ci: false,
            arch: Arch::default(),
            extractors: Extractors::default(),
            ssl_verification: true,
            skip_domain_substitution: false,
            layout,
        }
    }

    /// Switch to CI mode running only `step`
    pub fn with_ci_step(mut self, step: Step) -> Self {
        self.ci = true;
        self.selection = StepSelection::Only(step);
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }
}
