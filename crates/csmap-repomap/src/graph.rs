use std::collections::HashMap;

use csmap_core::{BoostRule, PageRankConfig};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::modules::module_of;
use crate::parser::{RefType, Reference, Symbol, SymbolKind};

/// Last-seen declaration facts for a graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub file: String,
    pub kind: SymbolKind,
    /// Multiplier from the configured boost rules, at least 1.0.
    pub boost: f64,
}

/// One entry of the ranked symbol list.
///
/// `info` is `None` for reference targets that were never declared.
#[derive(Debug, Clone, Copy)]
pub struct RankedEntry<'a> {
    pub name: &'a str,
    pub score: f64,
    pub info: Option<&'a SymbolInfo>,
}

/// Summary of the graph and the ranking that ran over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    /// Name of the strategy whose scores were kept, or `none` before ranking.
    pub strategy: String,
    /// Weak connectivity; `false` for an empty graph.
    pub is_connected: bool,
}

/// Why a ranking strategy could not produce scores.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("invalid PageRank parameter: {0}")]
    InvalidParameter(String),
    #[error("graph has no nodes")]
    EmptyGraph,
    #[error("ranking produced a non-finite score")]
    NonFinite,
}

/// A centrality measure over a [`SymbolGraph`].
///
/// Returns one raw score per node index, or `None` for nodes the strategy
/// does not rank. Boosts are applied afterwards by the graph.
pub trait RankStrategy {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns a [`RankError`] when scores cannot be computed; the caller then
    /// falls back to [`InDegree`].
    fn centrality(&self, graph: &SymbolGraph) -> Result<Vec<Option<f64>>, RankError>;
}

/// Power-iteration PageRank with uniform redistribution of dangling mass.
///
/// # Examples
///
/// ```
/// use csmap_core::PageRankConfig;
/// use csmap_repomap::graph::PageRank;
///
/// let pr = PageRank::from(PageRankConfig::default());
/// assert_eq!(pr.alpha, 0.85);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PageRank {
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl From<PageRankConfig> for PageRank {
    fn from(config: PageRankConfig) -> Self {
        Self {
            alpha: config.alpha,
            max_iter: config.max_iter,
            tol: config.tol,
        }
    }
}

impl Default for PageRank {
    fn default() -> Self {
        PageRankConfig::default().into()
    }
}

impl RankStrategy for PageRank {
    fn name(&self) -> &'static str {
        "pagerank"
    }

    fn centrality(&self, graph: &SymbolGraph) -> Result<Vec<Option<f64>>, RankError> {
        let alpha = self.alpha;
        if alpha.is_nan() || alpha <= 0.0 || alpha >= 1.0 {
            return Err(RankError::InvalidParameter(format!("alpha = {alpha}")));
        }
        if self.max_iter == 0 {
            return Err(RankError::InvalidParameter("max_iter = 0".into()));
        }
        if self.tol.is_nan() || self.tol <= 0.0 {
            return Err(RankError::InvalidParameter(format!("tol = {}", self.tol)));
        }

        let g = &graph.graph;
        let n = g.node_count();
        if n == 0 {
            return Err(RankError::EmptyGraph);
        }
        let n_f64 = n as f64;

        let out_degree: Vec<usize> = g
            .node_indices()
            .map(|idx| g.neighbors_directed(idx, Direction::Outgoing).count())
            .collect();

        let mut ranks = vec![1.0 / n_f64; n];
        for _ in 0..self.max_iter {
            let dangling: f64 = ranks
                .iter()
                .zip(&out_degree)
                .filter(|(_, &deg)| deg == 0)
                .map(|(r, _)| r)
                .sum();
            let base = (1.0 - alpha) / n_f64 + alpha * dangling / n_f64;
            let mut next = vec![base; n];

            for node_idx in g.node_indices() {
                let i = node_idx.index();
                if out_degree[i] == 0 {
                    continue;
                }
                let contribution = alpha * ranks[i] / out_degree[i] as f64;
                for neighbor in g.neighbors_directed(node_idx, Direction::Outgoing) {
                    next[neighbor.index()] += contribution;
                }
            }

            let delta: f64 = next.iter().zip(&ranks).map(|(a, b)| (a - b).abs()).sum();
            ranks = next;
            if delta < self.tol {
                break;
            }
        }

        if ranks.iter().any(|r| !r.is_finite()) {
            return Err(RankError::NonFinite);
        }
        Ok(ranks.into_iter().map(Some).collect())
    }
}

/// In-degree normalized by the largest in-degree in the graph. Only declared
/// symbols are ranked.
#[derive(Debug, Clone, Copy, Default)]
pub struct InDegree;

impl RankStrategy for InDegree {
    fn name(&self) -> &'static str {
        "in_degree"
    }

    fn centrality(&self, graph: &SymbolGraph) -> Result<Vec<Option<f64>>, RankError> {
        let g = &graph.graph;
        let in_degree: Vec<usize> = g
            .node_indices()
            .map(|idx| g.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        let max = in_degree.iter().copied().max().unwrap_or(0);

        Ok(g.node_indices()
            .map(|idx| {
                graph.info[idx.index()].as_ref().map(|_| {
                    if max == 0 {
                        0.0
                    } else {
                        in_degree[idx.index()] as f64 / max as f64
                    }
                })
            })
            .collect())
    }
}

/// Largest boost among the rules matching `name`, never below 1.0.
///
/// # Examples
///
/// ```
/// use csmap_core::BoostRule;
/// use csmap_repomap::graph::boost_for;
///
/// let rules = vec![BoostRule::prefix("S", 2.0), BoostRule::suffix("Manager", 1.5)];
/// assert_eq!(boost_for("SAudioManager", &rules), 2.0);
/// assert_eq!(boost_for("AudioManager", &rules), 1.5);
/// assert_eq!(boost_for("Settings", &rules), 1.0);
/// ```
pub fn boost_for(name: &str, rules: &[BoostRule]) -> f64 {
    rules
        .iter()
        .filter(|rule| rule_matches(rule, name))
        .map(|rule| rule.boost)
        .fold(1.0, f64::max)
}

fn rule_matches(rule: &BoostRule, name: &str) -> bool {
    let prefix = rule.prefix.as_deref().is_some_and(|p| {
        name.strip_prefix(p)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_uppercase())
    });
    let suffix = rule.suffix.as_deref().is_some_and(|s| name.ends_with(s));
    let contains = rule.contains.as_deref().is_some_and(|c| name.contains(c));
    prefix || suffix || contains
}

/// Directed graph of type names linked by inheritance and implementation.
///
/// Nodes are keyed by name: same-named types from different files share one
/// node, and its [`SymbolInfo`] comes from the last declaration seen.
///
/// # Examples
///
/// ```
/// use csmap_repomap::graph::{PageRank, SymbolGraph};
/// use csmap_repomap::parser::{RefType, Reference, Symbol, SymbolKind};
///
/// let symbols = vec![
///     Symbol::new("PlayerController", SymbolKind::Class, "Game/Player.cs", 3),
///     Symbol::new("ActorBase", SymbolKind::Class, "Core/Actor.cs", 1),
/// ];
/// let references = vec![Reference {
///     ref_type: RefType::Inherits,
///     from_symbol: "PlayerController".into(),
///     to_symbol: "ActorBase".into(),
///     source_file: "Game/Player.cs".into(),
/// }];
/// let mut graph = SymbolGraph::build(&symbols, &references, &[]);
/// graph.compute_ranks(&PageRank::default());
/// assert_eq!(graph.ranked_symbols(None)[0].name, "ActorBase");
/// ```
#[derive(Debug, Clone)]
pub struct SymbolGraph {
    graph: DiGraph<String, RefType>,
    name_to_index: HashMap<String, NodeIndex>,
    info: Vec<Option<SymbolInfo>>,
    scores: Vec<Option<f64>>,
    strategy_used: Option<&'static str>,
}

impl SymbolGraph {
    /// Build the graph. Type symbols become nodes in input order, then
    /// undeclared reference targets in reference order. Repeated edges
    /// collapse to one and self-references are dropped.
    pub fn build(symbols: &[Symbol], references: &[Reference], boosts: &[BoostRule]) -> Self {
        let mut this = Self {
            graph: DiGraph::new(),
            name_to_index: HashMap::new(),
            info: Vec::new(),
            scores: Vec::new(),
            strategy_used: None,
        };

        for symbol in symbols.iter().filter(|s| s.kind.is_type()) {
            let idx = this.node(&symbol.name);
            this.info[idx.index()] = Some(SymbolInfo {
                file: symbol.file.clone(),
                kind: symbol.kind,
                boost: boost_for(&symbol.name, boosts),
            });
        }

        for reference in references {
            let from = this.node(&reference.from_symbol);
            let to = this.node(&reference.to_symbol);
            if from == to {
                continue;
            }
            this.graph.update_edge(from, to, reference.ref_type);
        }

        this.scores = vec![None; this.graph.node_count()];
        this
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.name_to_index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.name_to_index.insert(name.to_string(), idx);
        self.info.push(None);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Declaration facts for `name`, if it was declared.
    pub fn info(&self, name: &str) -> Option<&SymbolInfo> {
        let idx = self.name_to_index.get(name)?;
        self.info[idx.index()].as_ref()
    }

    /// Boosted score for `name`, or 0.0 when it is unknown or unranked.
    pub fn score(&self, name: &str) -> f64 {
        self.name_to_index
            .get(name)
            .and_then(|idx| self.scores[idx.index()])
            .unwrap_or(0.0)
    }

    /// Rank every node with `primary`, falling back to [`InDegree`] when the
    /// graph is empty or `primary` fails. Scores are multiplied by each
    /// node's boost.
    pub fn compute_ranks(&mut self, primary: &dyn RankStrategy) {
        let (raw, used) = if self.graph.node_count() == 0 {
            (Vec::new(), InDegree.name())
        } else {
            match primary.centrality(self) {
                Ok(raw) => (raw, primary.name()),
                Err(e) => {
                    tracing::warn!("{} ranking failed, using in-degree: {e}", primary.name());
                    (InDegree.centrality(self).unwrap_or_default(), InDegree.name())
                }
            }
        };

        self.scores = raw
            .into_iter()
            .enumerate()
            .map(|(i, score)| {
                let boost = self.info[i].as_ref().map_or(1.0, |info| info.boost);
                score.map(|s| s * boost)
            })
            .collect();
        self.scores.resize(self.graph.node_count(), None);
        self.strategy_used = Some(used);
        tracing::debug!(
            strategy = used,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "ranked symbol graph"
        );
    }

    /// Ranked nodes, highest score first. Equal scores keep node order.
    pub fn ranked_symbols(&self, limit: Option<usize>) -> Vec<RankedEntry<'_>> {
        let mut entries: Vec<RankedEntry<'_>> = self
            .graph
            .node_indices()
            .filter_map(|idx| {
                let score = self.scores[idx.index()]?;
                Some(RankedEntry {
                    name: self.graph[idx].as_str(),
                    score,
                    info: self.info[idx.index()].as_ref(),
                })
            })
            .collect();
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }

    /// Sum of symbol scores per declaring file, in first-seen order.
    pub fn file_ranks(&self) -> Vec<(String, f64)> {
        let mut ranks: Vec<(String, f64)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for idx in self.graph.node_indices() {
            let (Some(score), Some(info)) = (self.scores[idx.index()], &self.info[idx.index()])
            else {
                continue;
            };
            match index.get(info.file.as_str()) {
                Some(&slot) => ranks[slot].1 += score,
                None => {
                    index.insert(info.file.as_str(), ranks.len());
                    ranks.push((info.file.clone(), score));
                }
            }
        }
        ranks
    }

    /// Sum of file ranks per module, in first-seen order.
    pub fn module_ranks(&self) -> Vec<(String, f64)> {
        let mut ranks: Vec<(String, f64)> = Vec::new();
        for (file, score) in self.file_ranks() {
            let module = module_of(&file);
            match ranks.iter_mut().find(|(name, _)| name == module) {
                Some(entry) => entry.1 += score,
                None => ranks.push((module.to_string(), score)),
            }
        }
        ranks
    }

    pub fn stats(&self) -> GraphStats {
        let nodes = self.graph.node_count();
        GraphStats {
            nodes,
            edges: self.graph.edge_count(),
            strategy: self.strategy_used.unwrap_or("none").to_string(),
            is_connected: nodes > 0 && petgraph::algo::connected_components(&self.graph) == 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_symbol(name: &str, file: &str) -> Symbol {
        Symbol::new(name, SymbolKind::Class, file, 1)
    }

    fn make_ref(from: &str, to: &str) -> Reference {
        Reference {
            ref_type: RefType::Inherits,
            from_symbol: from.to_string(),
            to_symbol: to.to_string(),
            source_file: "test.cs".to_string(),
        }
    }

    /// Strategy that always fails, to exercise the fallback.
    struct Broken;

    impl RankStrategy for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn centrality(&self, _graph: &SymbolGraph) -> Result<Vec<Option<f64>>, RankError> {
            Err(RankError::NonFinite)
        }
    }

    fn names<'a>(entries: &[RankedEntry<'a>]) -> Vec<&'a str> {
        entries.iter().map(|e| e.name).collect()
    }

    #[test]
    fn pagerank_linked_chain() {
        // Alpha -> Bravo -> Charlie: the end of the chain collects the most rank.
        let symbols = vec![
            make_symbol("Alpha", "a.cs"),
            make_symbol("Bravo", "b.cs"),
            make_symbol("Charlie", "c.cs"),
        ];
        let refs = vec![make_ref("Alpha", "Bravo"), make_ref("Bravo", "Charlie")];

        let mut graph = SymbolGraph::build(&symbols, &refs, &[]);
        graph.compute_ranks(&PageRank::default());
        let ranked = graph.ranked_symbols(None);

        assert_eq!(names(&ranked), vec!["Charlie", "Bravo", "Alpha"]);
        assert!(ranked[0].score > ranked[2].score);
        assert_eq!(graph.stats().strategy, "pagerank");
    }

    #[test]
    fn pagerank_mass_sums_to_one_without_boosts() {
        let symbols = vec![
            make_symbol("Alpha", "a.cs"),
            make_symbol("Bravo", "b.cs"),
            make_symbol("Charlie", "c.cs"),
        ];
        let refs = vec![
            make_ref("Alpha", "Bravo"),
            make_ref("Charlie", "Bravo"),
            make_ref("Bravo", "External"),
        ];
        let mut graph = SymbolGraph::build(&symbols, &refs, &[]);
        graph.compute_ranks(&PageRank::default());

        let total: f64 = graph.ranked_symbols(None).iter().map(|e| e.score).sum();
        assert!((total - 1.0).abs() < 1e-6, "total rank {total}");
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn disconnected_nodes_get_equal_rank() {
        let symbols = vec![make_symbol("Xenon", "x.cs"), make_symbol("Yttrium", "y.cs")];
        let mut graph = SymbolGraph::build(&symbols, &[], &[]);
        graph.compute_ranks(&PageRank::default());
        let ranked = graph.ranked_symbols(None);

        assert_eq!(ranked.len(), 2);
        assert!((ranked[0].score - ranked[1].score).abs() < 1e-10);
        // Ties keep insertion order.
        assert_eq!(names(&ranked), vec!["Xenon", "Yttrium"]);
        assert!(!graph.stats().is_connected);
    }

    #[test]
    fn duplicate_edges_and_self_loops_collapse() {
        let symbols = vec![make_symbol("Alpha", "a.cs"), make_symbol("Bravo", "b.cs")];
        let refs = vec![
            make_ref("Alpha", "Bravo"),
            make_ref("Alpha", "Bravo"),
            make_ref("Alpha", "Alpha"),
        ];
        let graph = SymbolGraph::build(&symbols, &refs, &[]);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.stats().strategy, "none");
        assert!(graph.stats().is_connected);
    }

    #[test]
    fn invalid_parameters_fall_back_to_in_degree() {
        let symbols = vec![make_symbol("Alpha", "a.cs"), make_symbol("Bravo", "b.cs")];
        let refs = vec![make_ref("Alpha", "Bravo"), make_ref("Alpha", "ExternalBase")];
        let mut graph = SymbolGraph::build(&symbols, &refs, &[]);

        let bad = PageRank {
            alpha: 1.5,
            ..PageRank::default()
        };
        graph.compute_ranks(&bad);

        assert_eq!(graph.stats().strategy, "in_degree");
        // Undeclared targets are not ranked by the fallback.
        assert_eq!(names(&graph.ranked_symbols(None)), vec!["Bravo", "Alpha"]);
        assert_eq!(graph.score("Bravo"), 1.0);
        assert_eq!(graph.score("ExternalBase"), 0.0);
    }

    #[test]
    fn failing_strategy_falls_back() {
        let symbols = vec![make_symbol("Alpha", "a.cs")];
        let mut graph = SymbolGraph::build(&symbols, &[], &[]);
        graph.compute_ranks(&Broken);
        assert_eq!(graph.stats().strategy, "in_degree");
        assert_eq!(graph.score("Alpha"), 0.0);
    }

    #[test]
    fn in_degree_is_monotonic() {
        let symbols = vec![
            make_symbol("Popular", "p.cs"),
            make_symbol("Modest", "m.cs"),
            make_symbol("First", "1.cs"),
            make_symbol("Second", "2.cs"),
        ];
        let refs = vec![
            make_ref("First", "Popular"),
            make_ref("Second", "Popular"),
            make_ref("First", "Modest"),
        ];
        let mut graph = SymbolGraph::build(&symbols, &refs, &[]);
        graph.compute_ranks(&InDegree);
        assert!(graph.score("Popular") >= graph.score("Modest"));
        assert!(graph.score("Modest") >= graph.score("First"));
    }

    #[test]
    fn boost_is_a_post_multiplier() {
        let symbols = vec![
            make_symbol("AudioManager", "a.cs"),
            make_symbol("Inventory", "i.cs"),
        ];
        let rules = vec![BoostRule::suffix("Manager", 1.5)];

        let mut plain = SymbolGraph::build(&symbols, &[], &[]);
        plain.compute_ranks(&PageRank::default());
        let mut boosted = SymbolGraph::build(&symbols, &[], &rules);
        boosted.compute_ranks(&PageRank::default());

        let ratio = boosted.score("AudioManager") / plain.score("AudioManager");
        assert!((ratio - 1.5).abs() < 1e-9);
        assert!((boosted.score("Inventory") - plain.score("Inventory")).abs() < 1e-12);
        assert_eq!(boosted.info("AudioManager").map(|i| i.boost), Some(1.5));
    }

    #[test]
    fn prefix_rule_needs_uppercase_after_prefix() {
        let rules = vec![BoostRule::prefix("S", 2.0)];
        assert_eq!(boost_for("SNetwork", &rules), 2.0);
        assert_eq!(boost_for("Settings", &rules), 1.0);
        assert_eq!(boost_for("S", &rules), 1.0);
        assert_eq!(boost_for("Inventory", &[BoostRule::contains("vent", 1.2)]), 1.2);
        assert_eq!(boost_for("Inventory", &[BoostRule::contains("vent", 0.5)]), 1.0);
    }

    #[test]
    fn same_name_keeps_last_seen_file() {
        let symbols = vec![
            make_symbol("GameState", "Core/State.cs"),
            make_symbol("GameState", "Game/State.cs"),
        ];
        let mut graph = SymbolGraph::build(&symbols, &[], &[]);
        graph.compute_ranks(&PageRank::default());
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.info("GameState").map(|i| i.file.as_str()), Some("Game/State.cs"));
        let files = graph.file_ranks();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "Game/State.cs");
        assert!((files[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn file_and_module_aggregation() {
        let symbols = vec![
            make_symbol("Alpha", "Core/a.cs"),
            make_symbol("Bravo", "Game/b.cs"),
            make_symbol("Charlie", "Core/c.cs"),
            make_symbol("Delta", "Core/a.cs"),
        ];
        let mut graph = SymbolGraph::build(&symbols, &[], &[]);
        graph.compute_ranks(&PageRank::default());

        let files = graph.file_ranks();
        let file_names: Vec<&str> = files.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(file_names, vec!["Core/a.cs", "Game/b.cs", "Core/c.cs"]);
        assert!((files[0].1 - 0.5).abs() < 1e-9);

        let modules = graph.module_ranks();
        assert_eq!(modules[0].0, "Core");
        assert!((modules[0].1 - 0.75).abs() < 1e-9);
        assert_eq!(modules[1].0, "Game");
    }

    #[test]
    fn empty_graph_uses_fallback() {
        let mut graph = SymbolGraph::build(&[], &[], &[]);
        graph.compute_ranks(&PageRank::default());
        assert!(graph.ranked_symbols(None).is_empty());
        let stats = graph.stats();
        assert_eq!(stats.nodes, 0);
        assert_eq!(stats.strategy, "in_degree");
        assert!(!stats.is_connected);
    }
}
