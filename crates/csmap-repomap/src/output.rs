use std::collections::HashMap;

use csmap_core::{CategoryRule, CsmapError, RepomapConfig, Tier};
use serde::{Deserialize, Serialize};

use crate::budget::{trim_keep_last, trim_sections, trim_tail, TokenCounter};
use crate::graph::GraphStats;
use crate::modules::{module_of, top_by_class_count, ModuleInfo, TopModule};
use crate::parser::{RefType, Symbol, SymbolKind};
use crate::RepoMap;

const OVERVIEW_MODULES_PER_CATEGORY: usize = 10;
const ENTRY_CLASSES: usize = 20;
const ENTRY_METHODS: usize = 3;
const SIGNATURE_MODULES: usize = 15;
const SIGNATURE_TYPES_PER_MODULE: usize = 5;
const SIGNATURE_METHODS_PER_TYPE: usize = 5;
const RELATION_SYMBOLS: usize = 30;
const RELATION_OUTGOING: usize = 5;
const RELATION_INCOMING: usize = 3;
const TOP_MODULES: usize = 10;

/// Caller-supplied facts that reports embed but do not compute.
///
/// Keeping these outside the renderers makes every report a pure function of
/// its inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportContext {
    pub project_name: String,
    /// Full commit hash, empty when unknown.
    pub commit: String,
    pub branch: String,
    /// Date shown in the overview header.
    pub generated_on: String,
    /// Timestamp stored in the metadata.
    pub generated_at: String,
    pub source_path: String,
}

impl ReportContext {
    /// First eight characters of the commit, or `unknown`.
    ///
    /// # Examples
    ///
    /// ```
    /// use csmap_repomap::output::ReportContext;
    ///
    /// let mut ctx = ReportContext::default();
    /// assert_eq!(ctx.short_commit(), "unknown");
    /// ctx.commit = "3f9c2a7b1d0e".into();
    /// assert_eq!(ctx.short_commit(), "3f9c2a7b");
    /// ```
    pub fn short_commit(&self) -> &str {
        if self.commit.is_empty() {
            return "unknown";
        }
        match self.commit.char_indices().nth(8) {
            Some((end, _)) => &self.commit[..end],
            None => &self.commit,
        }
    }
}

/// One rendered tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub tier: Tier,
    pub text: String,
    /// Size of `text` as measured by the counter that trimmed it.
    pub tokens: usize,
}

impl Report {
    pub(crate) fn new(tier: Tier, lines: Vec<String>, counter: &dyn TokenCounter) -> Self {
        let text = lines.join("\n");
        let tokens = counter.count(&text);
        Self { tier, text, tokens }
    }
}

/// Machine-readable summary written next to the tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub project_name: String,
    pub git_commit: String,
    pub git_branch: String,
    pub generated_at: String,
    pub source_path: String,
    pub stats: MapStats,
    pub top_modules: Vec<TopModule>,
    pub ranker_stats: GraphStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapStats {
    pub file_count: usize,
    pub class_count: usize,
    pub method_count: usize,
    pub reference_count: usize,
    pub module_count: usize,
}

/// Tier 1: modules by category and the highest-ranked entry types.
pub fn render_skeleton(
    map: &RepoMap,
    config: &RepomapConfig,
    ctx: &ReportContext,
    counter: &dyn TokenCounter,
) -> Report {
    let mut lines = vec![
        format!("# {} Repo Map (L1)", ctx.project_name),
        format!(
            "> Generated: {} | Commit: {}",
            ctx.generated_on,
            ctx.short_commit()
        ),
        String::new(),
        format!("## Module Overview ({} modules)", map.modules.len()),
        String::new(),
    ];
    let header_len = lines.len();

    let module_ranks: HashMap<String, f64> = map.graph.module_ranks().into_iter().collect();
    let rank_of = |m: &ModuleInfo| module_ranks.get(&m.name).copied().unwrap_or(0.0);
    let mut ranked_modules: Vec<&ModuleInfo> = map.modules.iter().collect();
    ranked_modules.sort_by(|a, b| rank_of(b).total_cmp(&rank_of(a)));

    let mut buckets = category_buckets(&config.categories);
    for module in ranked_modules {
        let slot = category_slot(&module.name, &config.categories, &buckets);
        buckets[slot].1.push(module);
    }

    for (category, modules) in &buckets {
        if modules.is_empty() {
            continue;
        }
        lines.push(format!("### {category}"));
        for module in modules.iter().take(OVERVIEW_MODULES_PER_CATEGORY) {
            let active = if config
                .importance_boost
                .priority_modules
                .iter()
                .any(|p| p == &module.name)
            {
                " [Active]"
            } else {
                ""
            };
            lines.push(format!(
                "- {}/ ({} classes){active}",
                module.name, module.class_count
            ));
        }
        lines.push(String::new());
    }

    let methods = methods_by_type(&map.symbols);
    lines.push("### Core Entry Classes".into());
    lines.push("| Module | Entry Class | Key Methods |".into());
    lines.push("|--------|-------------|-------------|".into());
    for entry in map.graph.ranked_symbols(Some(ENTRY_CLASSES)) {
        let module = entry.info.map_or("-", |info| module_of(&info.file));
        let key_methods: Vec<&str> = methods
            .get(entry.name)
            .map(|ms| ms.iter().take(ENTRY_METHODS).map(|m| m.name.as_str()).collect())
            .unwrap_or_default();
        let key_methods = if key_methods.is_empty() {
            "-".to_string()
        } else {
            key_methods.join(", ")
        };
        lines.push(format!("| {module} | {} | {key_methods} |", entry.name));
    }

    trim_keep_last(&mut lines, header_len, counter, config.tokens.l1_skeleton);
    Report::new(Tier::Skeleton, lines, counter)
}

/// Category names in rule order, with `Other` appended when absent.
fn category_buckets<'m>(rules: &[CategoryRule]) -> Vec<(String, Vec<&'m ModuleInfo>)> {
    let mut buckets: Vec<(String, Vec<&'m ModuleInfo>)> = Vec::new();
    for rule in rules {
        if !buckets.iter().any(|(name, _)| name == &rule.name) {
            buckets.push((rule.name.clone(), Vec::new()));
        }
    }
    if !buckets.iter().any(|(name, _)| name == "Other") {
        buckets.push(("Other".into(), Vec::new()));
    }
    buckets
}

/// First rule with a pattern contained in `module`, ignoring case.
fn category_slot(
    module: &str,
    rules: &[CategoryRule],
    buckets: &[(String, Vec<&ModuleInfo>)],
) -> usize {
    let lower = module.to_lowercase();
    let category = rules
        .iter()
        .find(|rule| {
            rule.patterns
                .iter()
                .any(|p| lower.contains(&p.to_lowercase()))
        })
        .map_or("Other", |rule| rule.name.as_str());
    buckets
        .iter()
        .position(|(name, _)| name == category)
        .unwrap_or(buckets.len() - 1)
}

/// Tier 2: per-module type signatures with their public methods.
pub fn render_signatures(
    map: &RepoMap,
    config: &RepomapConfig,
    ctx: &ReportContext,
    counter: &dyn TokenCounter,
) -> Report {
    let mut lines = vec![
        format!("# {} Repo Map (L2)", ctx.project_name),
        String::new(),
    ];

    // (module, total rank, ranked type names), first-seen order
    let mut groups: Vec<(&str, f64, Vec<&str>)> = Vec::new();
    for entry in map.graph.ranked_symbols(None) {
        let Some(info) = entry.info else {
            continue;
        };
        let module = module_of(&info.file);
        match groups.iter_mut().find(|(name, _, _)| *name == module) {
            Some(group) => {
                group.1 += entry.score;
                group.2.push(entry.name);
            }
            None => groups.push((module, entry.score, vec![entry.name])),
        }
    }
    groups.sort_by(|a, b| b.1.total_cmp(&a.1));

    let first_declaration = first_type_declarations(&map.symbols);
    let methods = methods_by_type(&map.symbols);

    for (module, total, names) in groups.iter().take(SIGNATURE_MODULES) {
        lines.push(format!(
            "## {module} ({} classes, rank: {total:.4})",
            names.len()
        ));
        lines.push(String::new());
        for name in names.iter().take(SIGNATURE_TYPES_PER_MODULE) {
            let Some(symbol) = first_declaration.get(name) else {
                continue;
            };
            lines.push(format!("### {}", symbol.signature));
            if let Some(type_methods) = methods.get(name) {
                for method in type_methods.iter().take(SIGNATURE_METHODS_PER_TYPE) {
                    lines.push(format!("- {}", method.signature));
                }
            }
            lines.push(String::new());
        }
    }

    trim_sections(&mut lines, counter, config.tokens.l2_signatures);
    Report::new(Tier::Signatures, lines, counter)
}

/// Tier 3: inheritance and implementation edges around the top symbols.
pub fn render_relations(
    map: &RepoMap,
    config: &RepomapConfig,
    ctx: &ReportContext,
    counter: &dyn TokenCounter,
) -> Report {
    let mut lines = vec![
        format!("# {} Repo Map (L3)", ctx.project_name),
        String::new(),
        "## Reference Graph".to_string(),
        String::new(),
    ];
    let header_len = lines.len();

    // Counts cover every reference; listed neighbours are deduplicated.
    let mut out_counts: HashMap<&str, usize> = HashMap::new();
    let mut in_counts: HashMap<&str, usize> = HashMap::new();
    let mut outgoing: HashMap<&str, Vec<(&str, RefType)>> = HashMap::new();
    let mut incoming: HashMap<&str, Vec<(&str, RefType)>> = HashMap::new();
    for reference in &map.references {
        let from = reference.from_symbol.as_str();
        let to = reference.to_symbol.as_str();
        *out_counts.entry(from).or_default() += 1;
        *in_counts.entry(to).or_default() += 1;
        let out = outgoing.entry(from).or_default();
        if !out.contains(&(to, reference.ref_type)) {
            out.push((to, reference.ref_type));
        }
        let inc = incoming.entry(to).or_default();
        if !inc.contains(&(from, reference.ref_type)) {
            inc.push((from, reference.ref_type));
        }
    }

    for entry in map.graph.ranked_symbols(Some(RELATION_SYMBOLS)) {
        let out = outgoing.get(entry.name).map_or(&[][..], Vec::as_slice);
        let inc = incoming.get(entry.name).map_or(&[][..], Vec::as_slice);
        if out.is_empty() && inc.is_empty() {
            continue;
        }
        lines.push(format!(
            "{} (in: {}, out: {}, rank: {:.4})",
            entry.name,
            in_counts.get(entry.name).copied().unwrap_or(0),
            out_counts.get(entry.name).copied().unwrap_or(0),
            entry.score
        ));
        for (target, ref_type) in out.iter().take(RELATION_OUTGOING) {
            lines.push(format!("  -> {target} ({ref_type})"));
        }
        for (source, ref_type) in inc.iter().take(RELATION_INCOMING) {
            lines.push(format!("  <- {source} ({ref_type})"));
        }
        lines.push(String::new());
    }

    trim_tail(&mut lines, header_len, counter, config.tokens.l3_relations);
    Report::new(Tier::Relations, lines, counter)
}

/// Counts and ranker facts for the metadata artifact.
pub fn build_metadata(map: &RepoMap, ctx: &ReportContext) -> Metadata {
    let mut files: Vec<&str> = map.symbols.iter().map(|s| s.file.as_str()).collect();
    files.sort_unstable();
    files.dedup();

    Metadata {
        project_name: ctx.project_name.clone(),
        git_commit: ctx.commit.clone(),
        git_branch: ctx.branch.clone(),
        generated_at: ctx.generated_at.clone(),
        source_path: ctx.source_path.clone(),
        stats: MapStats {
            file_count: files.len(),
            class_count: map.symbols.iter().filter(|s| s.kind.is_type()).count(),
            method_count: map
                .symbols
                .iter()
                .filter(|s| s.kind == SymbolKind::Method)
                .count(),
            reference_count: map.references.len(),
            module_count: map.modules.len(),
        },
        top_modules: top_by_class_count(&map.modules, TOP_MODULES),
        ranker_stats: map.graph.stats(),
    }
}

/// Pretty-printed JSON for `meta`.
///
/// # Errors
///
/// Returns [`CsmapError::Serialization`] if serialization fails.
pub fn format_metadata(meta: &Metadata) -> Result<String, CsmapError> {
    serde_json::to_string_pretty(meta).map_err(CsmapError::from)
}

/// Public methods grouped by enclosing type name, in declaration order.
fn methods_by_type(symbols: &[Symbol]) -> HashMap<&str, Vec<&Symbol>> {
    let mut methods: HashMap<&str, Vec<&Symbol>> = HashMap::new();
    for symbol in symbols.iter().filter(|s| s.kind == SymbolKind::Method) {
        methods
            .entry(symbol.enclosing_type.as_str())
            .or_default()
            .push(symbol);
    }
    methods
}

fn first_type_declarations(symbols: &[Symbol]) -> HashMap<&str, &Symbol> {
    let mut first: HashMap<&str, &Symbol> = HashMap::new();
    for symbol in symbols.iter().filter(|s| s.kind.is_type()) {
        first.entry(symbol.name.as_str()).or_insert(symbol);
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ApproxCounter;
    use crate::parser::{Reference, RefType};

    fn class(name: &str, file: &str, base: &str) -> Symbol {
        let mut symbol = Symbol::new(name, SymbolKind::Class, file, 1);
        symbol.base_type = base.to_string();
        symbol.signature = if base.is_empty() {
            format!("public class {name}")
        } else {
            format!("public class {name} : {base}")
        };
        symbol
    }

    fn method(name: &str, owner: &str, file: &str) -> Symbol {
        let mut symbol = Symbol::new(name, SymbolKind::Method, file, 2);
        symbol.enclosing_type = owner.to_string();
        symbol.signature = format!("void {name}()");
        symbol
    }

    fn inherits(from: &str, to: &str) -> Reference {
        Reference {
            ref_type: RefType::Inherits,
            from_symbol: from.into(),
            to_symbol: to.into(),
            source_file: "x.cs".into(),
        }
    }

    fn context() -> ReportContext {
        ReportContext {
            project_name: "Tanks".into(),
            commit: "0123456789abcdef".into(),
            branch: "main".into(),
            generated_on: "2026-10-18".into(),
            generated_at: "2026-10-18T09:30:00+00:00".into(),
            source_path: "Assets/Scripts".into(),
        }
    }

    fn sample_map() -> RepoMap {
        let symbols = vec![
            class("TankManager", "Game/TankManager.cs", "ActorBase"),
            method("Spawn", "TankManager", "Game/TankManager.cs"),
            method("Reset", "TankManager", "Game/TankManager.cs"),
            class("ActorBase", "Core/ActorBase.cs", ""),
            class("HealthPanel", "UI/HealthPanel.cs", "ActorBase"),
            method("Refresh", "HealthPanel", "UI/HealthPanel.cs"),
            class("Shell", "Weapons/Shell.cs", "MonoBehaviour"),
        ];
        let references = vec![
            inherits("TankManager", "ActorBase"),
            inherits("HealthPanel", "ActorBase"),
            inherits("Shell", "MonoBehaviour"),
        ];
        RepoMap::from_extraction(symbols, references, &RepomapConfig::default(), 4)
    }

    #[test]
    fn skeleton_layout() {
        let map = sample_map();
        let mut config = RepomapConfig::default();
        config.importance_boost.priority_modules = vec!["Game".into()];
        let report = render_skeleton(&map, &config, &context(), &ApproxCounter);
        let lines: Vec<&str> = report.text.lines().collect();

        assert_eq!(lines[0], "# Tanks Repo Map (L1)");
        assert_eq!(lines[1], "> Generated: 2026-10-18 | Commit: 01234567");
        assert_eq!(lines[3], "## Module Overview (4 modules)");
        assert!(lines.contains(&"### Core"));
        assert!(lines.contains(&"- Game/ (1 classes) [Active]"));
        assert!(lines.contains(&"- UI/ (1 classes)"));
        // Weapons matches no pattern and lands in Other, after the named categories.
        let other = lines.iter().position(|l| *l == "### Other").unwrap();
        let ui = lines.iter().position(|l| *l == "### UI").unwrap();
        assert!(other > ui);
        assert_eq!(lines[other + 1], "- Weapons/ (1 classes)");

        assert!(lines.contains(&"| Core | ActorBase | - |"));
        assert!(lines.contains(&"| Game | TankManager | Spawn, Reset |"));
        assert!(lines.contains(&"| - | MonoBehaviour | - |"));
        assert_eq!(report.tier, Tier::Skeleton);
    }

    #[test]
    fn other_is_appended_when_rules_lack_it() {
        let map = sample_map();
        let mut config = RepomapConfig::default();
        config.categories = vec![CategoryRule::new("Interface", &["ui"])];
        let report = render_skeleton(&map, &config, &context(), &ApproxCounter);
        let headings: Vec<&str> = report
            .text
            .lines()
            .filter(|l| l.starts_with("### ") && *l != "### Core Entry Classes")
            .collect();
        assert_eq!(headings, vec!["### Interface", "### Other"]);
    }

    #[test]
    fn skeleton_trim_keeps_header_and_last_line() {
        let map = sample_map();
        let mut config = RepomapConfig::default();
        config.tokens.l1_skeleton = 1;
        let report = render_skeleton(&map, &config, &context(), &ApproxCounter);
        let lines: Vec<&str> = report.text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "# Tanks Repo Map (L1)");
        assert!(lines[5].starts_with("| "));
    }

    #[test]
    fn signatures_group_by_module() {
        let map = sample_map();
        let report = render_signatures(&map, &RepomapConfig::default(), &context(), &ApproxCounter);
        let text = &report.text;

        assert!(text.starts_with("# Tanks Repo Map (L2)\n\n## Core (1 classes, rank: "));
        assert!(text.contains("### public class TankManager : ActorBase\n- void Spawn()\n- void Reset()\n"));
        assert!(text.contains("### public class HealthPanel : ActorBase\n- void Refresh()\n"));
        // Undeclared reference targets get no entry.
        assert!(!text.contains("### MonoBehaviour"));
        assert!(text.contains("## Weapons (1 classes, rank: "));
    }

    #[test]
    fn signatures_trim_whole_sections() {
        let map = sample_map();
        let mut config = RepomapConfig::default();
        config.tokens.l2_signatures = 40;
        let report = render_signatures(&map, &config, &context(), &ApproxCounter);
        assert!(report.tokens <= 40, "over budget: {}", report.tokens);
        assert!(report.text.contains("## Core ("));
        assert!(!report.text.contains("## Weapons ("));
        assert!(report.text.starts_with("# Tanks Repo Map (L2)"));
        for line in report.text.lines().filter(|l| l.starts_with("## ")) {
            let idx = report.text.find(line).unwrap();
            assert!(report.text[idx..].contains("### "), "section {line} left without body");
        }
    }

    #[test]
    fn relations_list_edges_both_ways() {
        let map = sample_map();
        let report = render_relations(&map, &RepomapConfig::default(), &context(), &ApproxCounter);
        let text = &report.text;

        assert!(text.starts_with("# Tanks Repo Map (L3)\n\n## Reference Graph\n\n"));
        assert!(text.contains("ActorBase (in: 2, out: 0, rank: "));
        assert!(text.contains("  <- TankManager (inherits)\n  <- HealthPanel (inherits)"));
        assert!(text.contains("TankManager (in: 0, out: 1, rank: "));
        assert!(text.contains("  -> ActorBase (inherits)"));
    }

    #[test]
    fn relation_counts_include_same_named_sources() {
        let symbols = vec![
            class("ActorBase", "Core/ActorBase.cs", ""),
            class("Spawner", "Game/Spawner.cs", "ActorBase"),
            class("Spawner", "Editor/Spawner.cs", "ActorBase"),
        ];
        let references = vec![inherits("Spawner", "ActorBase"), inherits("Spawner", "ActorBase")];
        let map = RepoMap::from_extraction(symbols, references, &RepomapConfig::default(), 2);
        let report = render_relations(&map, &RepomapConfig::default(), &context(), &ApproxCounter);
        let text = &report.text;

        assert!(text.contains("ActorBase (in: 2, out: 0, rank: "), "{text}");
        assert!(text.contains("Spawner (in: 0, out: 2, rank: "), "{text}");
        assert_eq!(text.matches("  <- Spawner (inherits)").count(), 1);
        assert_eq!(text.matches("  -> ActorBase (inherits)").count(), 1);
    }

    #[test]
    fn relations_trim_to_header() {
        let map = sample_map();
        let mut config = RepomapConfig::default();
        config.tokens.l3_relations = 1;
        let report = render_relations(&map, &config, &context(), &ApproxCounter);
        assert_eq!(report.text, "# Tanks Repo Map (L3)\n\n## Reference Graph\n");
    }

    #[test]
    fn metadata_counts() {
        let map = sample_map();
        let meta = build_metadata(&map, &context());
        assert_eq!(meta.stats.file_count, 4);
        assert_eq!(meta.stats.class_count, 4);
        assert_eq!(meta.stats.method_count, 3);
        assert_eq!(meta.stats.reference_count, 3);
        assert_eq!(meta.stats.module_count, 4);
        assert_eq!(meta.git_branch, "main");
        assert_eq!(meta.ranker_stats.nodes, 5);
        assert_eq!(meta.ranker_stats.strategy, "pagerank");

        let json = format_metadata(&meta).unwrap();
        let parsed: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, meta);
    }
}
