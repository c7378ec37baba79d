//! Ranked, token-budgeted maps of C# code bases.
//!
//! Source files are parsed with tree-sitter (falling back to a regex scanner),
//! type declarations and their inheritance edges form a petgraph graph ranked
//! with PageRank, and the ranking drives three Markdown reports of increasing
//! detail plus a JSON metadata record.

pub mod budget;
pub mod decode;
pub mod filter;
pub mod graph;
pub mod lexical;
pub mod modules;
pub mod output;
pub mod parser;
pub mod walker;

use std::path::Path;

use csmap_core::{CsmapError, RepomapConfig};
use rayon::prelude::*;

use crate::graph::{PageRank, SymbolGraph};
use crate::modules::ModuleInfo;
use crate::output::{Metadata, Report, ReportContext};
use crate::parser::{Extraction, Extractor, Reference, Symbol};
use crate::walker::SourceUnit;

/// Everything derived from one scan: the extracted symbols and references,
/// the ranked graph, and the module table.
#[derive(Debug, Clone)]
pub struct RepoMap {
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    pub graph: SymbolGraph,
    pub modules: Vec<ModuleInfo>,
    /// Number of source units that were extracted.
    pub scanned_files: usize,
}

impl RepoMap {
    /// Extract every unit in parallel and rank the result.
    ///
    /// Units are processed on the rayon pool; results are merged in input
    /// order, so the same units always produce the same map.
    ///
    /// # Examples
    ///
    /// ```
    /// use csmap_core::RepomapConfig;
    /// use csmap_repomap::RepoMap;
    /// use csmap_repomap::walker::SourceUnit;
    ///
    /// let units = vec![
    ///     SourceUnit::new("Core/ActorBase.cs", "public abstract class ActorBase {}"),
    ///     SourceUnit::new("Game/Tank.cs", "public class TankHull : ActorBase {}"),
    /// ];
    /// let map = RepoMap::build(&units, &RepomapConfig::default());
    /// assert_eq!(map.modules.len(), 2);
    /// assert_eq!(map.graph.ranked_symbols(Some(1))[0].name, "ActorBase");
    /// ```
    pub fn build(units: &[SourceUnit], config: &RepomapConfig) -> Self {
        let extractor = Extractor::new(config.source.use_syntax_tree);
        let extraction = extract_all(units, &extractor);
        Self::from_extraction(
            extraction.symbols,
            extraction.references,
            config,
            units.len(),
        )
    }

    /// Rank already-extracted symbols and references.
    pub fn from_extraction(
        symbols: Vec<Symbol>,
        references: Vec<Reference>,
        config: &RepomapConfig,
        scanned_files: usize,
    ) -> Self {
        let mut graph =
            SymbolGraph::build(&symbols, &references, &config.importance_boost.patterns);
        graph.compute_ranks(&PageRank::from(config.pagerank));
        let modules = modules::build_modules(&symbols);
        Self {
            symbols,
            references,
            graph,
            modules,
            scanned_files,
        }
    }
}

/// Run `extractor` over every unit on the rayon pool, merging in input order.
pub fn extract_all(units: &[SourceUnit], extractor: &Extractor) -> Extraction {
    let per_unit: Vec<Extraction> = units.par_iter().map(|u| extractor.extract(u)).collect();
    let mut merged = Extraction::default();
    for extraction in per_unit {
        merged.merge(extraction);
    }
    tracing::debug!(
        units = units.len(),
        symbols = merged.symbols.len(),
        references = merged.references.len(),
        "extracted"
    );
    merged
}

/// The three tiers and the metadata for one map.
#[derive(Debug, Clone)]
pub struct Reports {
    pub skeleton: Report,
    pub signatures: Report,
    pub relations: Report,
    pub meta: Metadata,
    pub scanned_files: usize,
}

impl Reports {
    /// Tiers in L1, L2, L3 order.
    pub fn tiers(&self) -> [&Report; 3] {
        [&self.skeleton, &self.signatures, &self.relations]
    }
}

/// Render every tier and the metadata for `map`.
pub fn render_reports(map: &RepoMap, config: &RepomapConfig, ctx: &ReportContext) -> Reports {
    let counter = budget::token_counter(config.tokens.counter, &config.tokens.encoding);
    tracing::debug!(counter = counter.label(), "rendering reports");
    Reports {
        skeleton: output::render_skeleton(map, config, ctx, counter.as_ref()),
        signatures: output::render_signatures(map, config, ctx, counter.as_ref()),
        relations: output::render_relations(map, config, ctx, counter.as_ref()),
        meta: output::build_metadata(map, ctx),
        scanned_files: map.scanned_files,
    }
}

/// Generate all reports for the source tree at `root`.
///
/// Walks the tree, extracts symbols, ranks them, and renders the tiers.
///
/// # Errors
///
/// Returns [`CsmapError`] if `root` is missing or an exclusion glob is
/// malformed. Per-file problems are logged and skipped.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use csmap_core::RepomapConfig;
/// use csmap_repomap::generate_map;
/// use csmap_repomap::output::ReportContext;
///
/// let config = RepomapConfig::default();
/// let ctx = ReportContext { project_name: config.project_name.clone(), ..Default::default() };
/// let reports = generate_map(Path::new("Assets/Scripts"), &config, &ctx).unwrap();
/// println!("{}", reports.skeleton.text);
/// ```
pub fn generate_map(
    root: &Path,
    config: &RepomapConfig,
    ctx: &ReportContext,
) -> Result<Reports, CsmapError> {
    let units = walker::walk_repo(root, &config.source)?;
    let map = RepoMap::build(&units, config);
    Ok(render_reports(&map, config, ctx))
}
