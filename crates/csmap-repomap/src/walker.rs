use std::path::Path;

use csmap_core::{CsmapError, SourceConfig};
use glob::Pattern;

/// Maximum file size to process (1 MB).
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// One source file: its raw bytes and its path relative to the scan root.
///
/// # Examples
///
/// ```
/// use csmap_repomap::walker::SourceUnit;
///
/// let unit = SourceUnit::new("Game/Player.cs", "public class Player {}");
/// assert_eq!(unit.path, "Game/Player.cs");
/// assert_eq!(unit.content.len(), 22);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// `/`-separated path relative to the scan root.
    pub path: String,
    /// Undecoded file content.
    pub content: Vec<u8>,
}

impl SourceUnit {
    pub fn new(path: &str, content: impl AsRef<[u8]>) -> Self {
        Self {
            path: path.to_string(),
            content: content.as_ref().to_vec(),
        }
    }
}

/// Compiled exclusion globs, matched against relative `/`-separated paths.
///
/// A pattern starting with `**/` also matches at the root, so `**/bin/**`
/// excludes both `bin/x.cs` and `src/bin/x.cs`.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    /// # Errors
    ///
    /// Returns [`CsmapError::Config`] for a malformed glob.
    ///
    /// # Examples
    ///
    /// ```
    /// use csmap_repomap::walker::ExcludeSet;
    ///
    /// let set = ExcludeSet::new(&["**/obj/**".to_string()]).unwrap();
    /// assert!(set.is_excluded("obj/Debug/Gen.cs"));
    /// assert!(set.is_excluded("Game/obj/Gen.cs"));
    /// assert!(!set.is_excluded("Game/Objects/Crate.cs"));
    /// ```
    pub fn new(globs: &[String]) -> Result<Self, CsmapError> {
        let mut patterns = Vec::new();
        for glob in globs {
            patterns.push(compile(glob)?);
            if let Some(rest) = glob.strip_prefix("**/") {
                patterns.push(compile(rest)?);
            }
        }
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, relative: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(relative))
    }
}

fn compile(glob: &str) -> Result<Pattern, CsmapError> {
    Pattern::new(glob).map_err(|e| CsmapError::Config(format!("invalid exclude pattern {glob:?}: {e}")))
}

/// Walk `root`, respecting `.gitignore`, and return matching source units
/// sorted by path.
///
/// Keeps files whose extension is listed in `source.file_extensions`
/// (case-insensitive, leading dot optional) and drops excluded, binary, and
/// oversized files.
///
/// # Errors
///
/// Returns [`CsmapError::FileNotFound`] if `root` is not a directory, or
/// [`CsmapError::Config`] for a malformed exclusion glob.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use csmap_core::SourceConfig;
/// use csmap_repomap::walker::walk_repo;
///
/// let units = walk_repo(Path::new("Assets/Scripts"), &SourceConfig::default()).unwrap();
/// for unit in &units {
///     println!("{}", unit.path);
/// }
/// ```
pub fn walk_repo(root: &Path, source: &SourceConfig) -> Result<Vec<SourceUnit>, CsmapError> {
    if !root.is_dir() {
        return Err(CsmapError::FileNotFound(root.to_path_buf()));
    }

    let excludes = ExcludeSet::new(&source.exclude_patterns)?;
    let extensions: Vec<String> = source
        .file_extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let walker = ignore::WalkBuilder::new(root).build();
    let mut units = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("skipping unreadable entry: {e}");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e.to_ascii_lowercase(),
            None => continue,
        };
        if !extensions.contains(&ext) {
            continue;
        }

        let relative = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => path,
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if excludes.is_excluded(&relative) {
            tracing::trace!(path = %relative, "excluded");
            continue;
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if metadata.len() > MAX_FILE_SIZE {
            tracing::debug!(path = %relative, size = metadata.len(), "skipping oversized file");
            continue;
        }

        let content = match std::fs::read(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %relative, "unreadable: {e}");
                continue;
            }
        };

        // Null bytes in the first 8KB mark binary content
        let check_len = content.len().min(BINARY_CHECK_SIZE);
        if content[..check_len].contains(&0) {
            continue;
        }

        units.push(SourceUnit {
            path: relative,
            content,
        });
    }

    units.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(root = %root.display(), files = units.len(), "walked source tree");
    Ok(units)
}
