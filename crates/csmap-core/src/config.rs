use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CsmapError;
use crate::types::TokenizerKind;

/// Top-level configuration loaded from `.repomap/config.toml`.
///
/// Every field has a default, so a partial file is merged over the defaults
/// section by section.
///
/// # Examples
///
/// ```
/// use csmap_core::RepomapConfig;
///
/// let config = RepomapConfig::default();
/// assert_eq!(config.tokens.l1_skeleton, 1000);
/// assert_eq!(config.pagerank.alpha, 0.85);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepomapConfig {
    /// Name shown in report titles.
    #[serde(default = "default_project_name")]
    pub project_name: String,
    /// Which files to scan.
    #[serde(default)]
    pub source: SourceConfig,
    /// Per-tier token budgets and tokenizer selection.
    #[serde(default)]
    pub tokens: TokenConfig,
    /// PageRank parameters.
    #[serde(default)]
    pub pagerank: PageRankConfig,
    /// Where reports are written.
    #[serde(default)]
    pub output: OutputConfig,
    /// Name-pattern boosts and highlighted modules.
    #[serde(default)]
    pub importance_boost: BoostConfig,
    /// Ordered module categories for the overview tier.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryRule>,
}

fn default_project_name() -> String {
    "C# Project".into()
}

impl Default for RepomapConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            source: SourceConfig::default(),
            tokens: TokenConfig::default(),
            pagerank: PageRankConfig::default(),
            output: OutputConfig::default(),
            importance_boost: BoostConfig::default(),
            categories: default_categories(),
        }
    }
}

impl RepomapConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CsmapError::Io`] if the file cannot be read, or
    /// [`CsmapError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use csmap_core::RepomapConfig;
    /// use std::path::Path;
    ///
    /// let config = RepomapConfig::from_file(Path::new(".repomap/config.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, CsmapError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CsmapError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use csmap_core::RepomapConfig;
    ///
    /// let toml = r#"
    /// project_name = "Tanks"
    /// [tokens]
    /// l2_signatures = 4000
    /// "#;
    /// let config = RepomapConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.project_name, "Tanks");
    /// assert_eq!(config.tokens.l2_signatures, 4000);
    /// assert_eq!(config.tokens.l1_skeleton, 1000);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, CsmapError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Render this configuration as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns [`CsmapError::TomlWrite`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, CsmapError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check numeric parameters for values the pipeline cannot use.
    ///
    /// # Errors
    ///
    /// Returns [`CsmapError::Config`] naming the first offending field.
    ///
    /// # Examples
    ///
    /// ```
    /// use csmap_core::RepomapConfig;
    ///
    /// let mut config = RepomapConfig::default();
    /// assert!(config.validate().is_ok());
    /// config.pagerank.alpha = 1.5;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), CsmapError> {
        let alpha = self.pagerank.alpha;
        if alpha.is_nan() || alpha <= 0.0 || alpha >= 1.0 {
            return Err(CsmapError::Config(format!(
                "pagerank.alpha must be in (0, 1), got {alpha}"
            )));
        }
        if self.pagerank.max_iter == 0 {
            return Err(CsmapError::Config(
                "pagerank.max_iter must be positive".into(),
            ));
        }
        if self.pagerank.tol.is_nan() || self.pagerank.tol <= 0.0 {
            return Err(CsmapError::Config("pagerank.tol must be positive".into()));
        }
        for (field, value) in [
            ("tokens.l1_skeleton", self.tokens.l1_skeleton),
            ("tokens.l2_signatures", self.tokens.l2_signatures),
            ("tokens.l3_relations", self.tokens.l3_relations),
        ] {
            if value == 0 {
                return Err(CsmapError::Config(format!("{field} must be positive")));
            }
        }
        if let Some(rule) = self
            .importance_boost
            .patterns
            .iter()
            .find(|r| r.prefix.is_none() && r.suffix.is_none() && r.contains.is_none())
        {
            return Err(CsmapError::Config(format!(
                "boost rule with boost {} has no prefix, suffix, or contains",
                rule.boost
            )));
        }
        Ok(())
    }
}

/// Source discovery settings.
///
/// # Examples
///
/// ```
/// use csmap_core::SourceConfig;
///
/// let source = SourceConfig::default();
/// assert_eq!(source.file_extensions, vec!["cs"]);
/// assert!(source.use_syntax_tree);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Scan root, relative to the project root.
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,
    /// Extensions to include, with or without the leading dot.
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,
    /// Glob patterns for paths to skip (matched against the relative path).
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    /// Parse with tree-sitter; when `false`, only the lexical fallback runs.
    #[serde(default = "default_true")]
    pub use_syntax_tree: bool,
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_extensions() -> Vec<String> {
    vec!["cs".into()]
}

fn default_exclude_patterns() -> Vec<String> {
    ["**/bin/**", "**/obj/**", "**/Editor/**", "**/Test/**"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            file_extensions: default_file_extensions(),
            exclude_patterns: default_exclude_patterns(),
            use_syntax_tree: true,
        }
    }
}

/// Token budgets for each tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Budget for the module overview (L1).
    #[serde(default = "default_l1")]
    pub l1_skeleton: usize,
    /// Budget for class signatures (L2).
    #[serde(default = "default_l2")]
    pub l2_signatures: usize,
    /// Budget for reference relations (L3).
    #[serde(default = "default_l3")]
    pub l3_relations: usize,
    /// BPE encoding name used by the exact counter.
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Exact (BPE) or approximate (4 chars per token) counting.
    #[serde(default)]
    pub counter: TokenizerKind,
}

fn default_l1() -> usize {
    1000
}

fn default_l2() -> usize {
    2000
}

fn default_l3() -> usize {
    3000
}

fn default_encoding() -> String {
    "cl100k_base".into()
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            l1_skeleton: default_l1(),
            l2_signatures: default_l2(),
            l3_relations: default_l3(),
            encoding: default_encoding(),
            counter: TokenizerKind::default(),
        }
    }
}

/// PageRank parameters.
///
/// # Examples
///
/// ```
/// use csmap_core::PageRankConfig;
///
/// let pr = PageRankConfig::default();
/// assert_eq!(pr.max_iter, 100);
/// assert_eq!(pr.tol, 1.0e-6);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRankConfig {
    /// Damping factor.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Iteration cap.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// L1 convergence tolerance.
    #[serde(default = "default_tol")]
    pub tol: f64,
}

fn default_alpha() -> f64 {
    0.85
}

fn default_max_iter() -> usize {
    100
}

fn default_tol() -> f64 {
    1.0e-6
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            max_iter: default_max_iter(),
            tol: default_tol(),
        }
    }
}

/// Output location and file names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for generated artifacts, relative to the project root.
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    /// File names of the four artifacts.
    #[serde(default)]
    pub files: OutputFiles,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".repomap/output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            files: OutputFiles::default(),
        }
    }
}

/// File names for each generated artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFiles {
    #[serde(default = "default_skeleton_file")]
    pub skeleton: String,
    #[serde(default = "default_signatures_file")]
    pub signatures: String,
    #[serde(default = "default_relations_file")]
    pub relations: String,
    #[serde(default = "default_meta_file")]
    pub meta: String,
}

fn default_skeleton_file() -> String {
    "repomap-L1-skeleton.md".into()
}

fn default_signatures_file() -> String {
    "repomap-L2-signatures.md".into()
}

fn default_relations_file() -> String {
    "repomap-L3-relations.md".into()
}

fn default_meta_file() -> String {
    "repomap-meta.json".into()
}

impl Default for OutputFiles {
    fn default() -> Self {
        Self {
            skeleton: default_skeleton_file(),
            signatures: default_signatures_file(),
            relations: default_relations_file(),
            meta: default_meta_file(),
        }
    }
}

/// Importance boosts applied after ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    /// Ordered name-pattern rules; the largest matching boost wins.
    #[serde(default = "default_boost_patterns")]
    pub patterns: Vec<BoostRule>,
    /// Modules flagged `[Active]` in the overview.
    #[serde(default)]
    pub priority_modules: Vec<String>,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            patterns: default_boost_patterns(),
            priority_modules: Vec::new(),
        }
    }
}

/// One boost rule. Exactly one of `prefix`, `suffix`, or `contains` is
/// normally set; if several are, any of them matching applies the boost.
///
/// # Examples
///
/// ```
/// use csmap_core::BoostRule;
///
/// let rule = BoostRule::suffix("Manager", 1.5);
/// assert_eq!(rule.suffix.as_deref(), Some("Manager"));
/// assert!(rule.prefix.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    /// Multiplier applied to the symbol's rank.
    pub boost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BoostRule {
    /// Rule matching names that start with `prefix` followed by an uppercase letter.
    pub fn prefix(prefix: &str, boost: f64) -> Self {
        Self {
            prefix: Some(prefix.into()),
            suffix: None,
            contains: None,
            boost,
            description: None,
        }
    }

    /// Rule matching names that end with `suffix`.
    pub fn suffix(suffix: &str, boost: f64) -> Self {
        Self {
            prefix: None,
            suffix: Some(suffix.into()),
            contains: None,
            boost,
            description: None,
        }
    }

    /// Rule matching names that contain `needle`.
    pub fn contains(needle: &str, boost: f64) -> Self {
        Self {
            prefix: None,
            suffix: None,
            contains: Some(needle.into()),
            boost,
            description: None,
        }
    }

    fn described(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn default_boost_patterns() -> Vec<BoostRule> {
    vec![
        BoostRule::prefix("S", 2.0).described("Service classes"),
        BoostRule::suffix("Manager", 1.5).described("Manager classes"),
        BoostRule::suffix("Controller", 1.5).described("Controller classes"),
        BoostRule::suffix("Service", 1.5).described("Service classes"),
    ]
}

/// A named module category matched by case-insensitive substring.
///
/// # Examples
///
/// ```
/// use csmap_core::CategoryRule;
///
/// let rule = CategoryRule::new("UI", &["View", "Panel"]);
/// assert_eq!(rule.patterns.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl CategoryRule {
    pub fn new(name: &str, patterns: &[&str]) -> Self {
        Self {
            name: name.into(),
            patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

fn default_categories() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new("Core", &["Core", "Common", "Util", "Base"]),
        CategoryRule::new("Game", &["Game", "Player", "Level", "Scene"]),
        CategoryRule::new("UI", &["UI", "View", "Panel", "Window", "Dialog"]),
        CategoryRule::new("Data", &["Data", "Model", "Entity", "Config"]),
        CategoryRule::new("Other", &[]),
    ]
}
