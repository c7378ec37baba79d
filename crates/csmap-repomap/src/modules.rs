//! Module table: type symbols grouped by the first path segment.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::parser::Symbol;

/// First `/`-separated segment of a relative path.
///
/// # Examples
///
/// ```
/// use csmap_repomap::modules::module_of;
///
/// assert_eq!(module_of("Game/Player/Controller.cs"), "Game");
/// assert_eq!(module_of("Program.cs"), "Program.cs");
/// ```
pub fn module_of(file: &str) -> &str {
    file.split('/').next().unwrap_or(file)
}

/// Aggregate facts about one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub class_count: usize,
    pub file_count: usize,
    /// Type names in declaration order.
    pub classes: Vec<String>,
}

/// `{name, classes}` entry of the metadata's top-module list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopModule {
    pub name: String,
    pub classes: usize,
}

/// Group type symbols by module, in first-seen order.
pub fn build_modules(symbols: &[Symbol]) -> Vec<ModuleInfo> {
    let mut modules: Vec<ModuleInfo> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut files: HashSet<(&str, &str)> = HashSet::new();

    for symbol in symbols.iter().filter(|s| s.kind.is_type()) {
        let module = module_of(&symbol.file);
        let slot = *index.entry(module).or_insert_with(|| {
            modules.push(ModuleInfo {
                name: module.to_string(),
                class_count: 0,
                file_count: 0,
                classes: Vec::new(),
            });
            modules.len() - 1
        });
        let info = &mut modules[slot];
        info.class_count += 1;
        info.classes.push(symbol.name.clone());
        if files.insert((module, symbol.file.as_str())) {
            info.file_count += 1;
        }
    }
    modules
}

/// The `limit` modules with the most types; ties keep first-seen order.
pub fn top_by_class_count(modules: &[ModuleInfo], limit: usize) -> Vec<TopModule> {
    let mut sorted: Vec<&ModuleInfo> = modules.iter().collect();
    sorted.sort_by(|a, b| b.class_count.cmp(&a.class_count));
    sorted
        .into_iter()
        .take(limit)
        .map(|m| TopModule {
            name: m.name.clone(),
            classes: m.class_count,
        })
        .collect()
}
