//! Text tree and DOT renderings of the graph, for manual inspection.

use std::{collections::HashSet, io::Write};

use snafu::ResultExt;

use crate::{
    error::{IoSnafu, Result},
    model::{Direction, Label, NodeId, RelType},
    txn::Transaction,
};

/// Indentation per tree level.
const INDENT: usize = 2;
/// Prefix of synonym lines.
pub const SYNONYM_SYMBOL: char = '=';
/// Prefix of usages whose name is a basionym.
pub const BASIONYM_SYMBOL: char = '$';

/// Writes the taxonomic tree as indented text.
///
/// Every taxon without parent starts a tree. Below each usage come its
/// synonyms, then its children, each group sorted by name. Lines read
/// `Abies alba Mill. [species]`.
///
/// # Errors
///
/// Returns `GraphError::Io` if writing fails.
pub fn print_tree(tx: &Transaction<'_>, out: &mut dyn Write) -> Result<()> {
    let mut roots: Vec<_> = tx
        .nodes_with_label(Label::Taxon)
        .into_iter()
        .filter(|n| tx.degree(*n, RelType::ParentOf, Direction::Incoming) == 0)
        .collect();
    sort_by_name(tx, &mut roots);

    let mut seen = HashSet::new();
    for root in roots {
        print_usage(tx, out, root, 0, &mut seen)?;
    }
    Ok(())
}

fn print_usage(
    tx: &Transaction<'_>,
    out: &mut dyn Write,
    node: NodeId,
    level: usize,
    seen: &mut HashSet<NodeId>,
) -> Result<()> {
    if !seen.insert(node) {
        return Ok(());
    }
    writeln!(out, "{}{}", " ".repeat(level * INDENT), usage_line(tx, node)).context(IoSnafu)?;

    let mut synonyms = tx.related(node, RelType::SynonymOf, Direction::Incoming);
    sort_by_name(tx, &mut synonyms);
    for synonym in synonyms {
        writeln!(out, "{}{}", " ".repeat((level + 1) * INDENT), usage_line(tx, synonym))
            .context(IoSnafu)?;
    }

    let mut children = tx.related(node, RelType::ParentOf, Direction::Outgoing);
    sort_by_name(tx, &mut children);
    for child in children {
        print_usage(tx, out, child, level + 1, seen)?;
    }
    Ok(())
}

fn usage_line(tx: &Transaction<'_>, usage: NodeId) -> String {
    let mut line = String::new();
    if tx.has_label(usage, Label::Synonym).unwrap_or(false) {
        line.push(SYNONYM_SYMBOL);
    }
    let name = tx.related(usage, RelType::HasName, Direction::Outgoing).first().copied();
    let Some(name) = name else {
        line.push_str(&usage.to_string());
        return line;
    };
    if tx.degree(name, RelType::HasBasionym, Direction::Incoming) > 0 {
        line.push(BASIONYM_SYMBOL);
    }
    line.push_str(&name_text(tx, name));
    line
}

fn name_text(tx: &Transaction<'_>, name: NodeId) -> String {
    let Ok(props) = tx.props(name) else {
        return name.to_string();
    };
    let mut text = props.scientific_name.clone().unwrap_or_else(|| props.id.clone());
    if let Some(authorship) = props.authorship.as_deref().filter(|a| !a.is_empty()) {
        text.push(' ');
        text.push_str(authorship);
    }
    text.push_str(&format!(" [{}]", props.rank.unwrap_or_default()));
    text
}

fn display_name(tx: &Transaction<'_>, node: NodeId) -> String {
    match tx.related(node, RelType::HasName, Direction::Outgoing).first() {
        Some(name) => name_text(tx, *name),
        None => name_text(tx, node),
    }
}

fn sort_by_name(tx: &Transaction<'_>, nodes: &mut [NodeId]) {
    nodes.sort_by_cached_key(|n| (display_name(tx, *n), *n));
}

/// Writes every node and edge in Graphviz DOT syntax.
///
/// # Errors
///
/// Returns `GraphError::Io` if writing fails.
pub fn print_dot(tx: &Transaction<'_>, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "digraph G {{").context(IoSnafu)?;
    writeln!(out, "  node [shape=box];").context(IoSnafu)?;
    for node in tx.node_ids() {
        let labels = tx.labels(node)?;
        let text = if labels.contains(Label::Name) || labels.contains(Label::BareName) {
            name_text(tx, node)
        } else {
            tx.props(node)?.id.clone()
        };
        writeln!(out, "  {node} [label=\"{}\\n{labels}\"];", escape(&text)).context(IoSnafu)?;
    }
    for edge in tx.all_edges() {
        writeln!(out, "  {} -> {} [label=\"{}\"];", edge.start, edge.end, edge.rel)
            .context(IoSnafu)?;
    }
    writeln!(out, "}}").context(IoSnafu)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use taxostage_test_utils::TestDir;
    use taxostage_types::Rank;

    use super::*;
    use crate::{EdgeProps, GraphDb, GraphWrite, LabelSet, NodeProps};

    fn usage(tx: &mut Transaction<'_>, label: Label, name: &str, rank: Rank) -> (NodeId, NodeId) {
        let props = NodeProps {
            id: format!("n-{name}"),
            scientific_name: Some(name.to_string()),
            authorship: None,
            rank: Some(rank),
        };
        let n = tx.create_node(LabelSet::of(Label::Name), props).unwrap().id();
        let u = tx.create_node(LabelSet::of(label), NodeProps::with_id(name)).unwrap().id();
        tx.create_edge(u, n, RelType::HasName, EdgeProps::default()).unwrap();
        (u, n)
    }

    #[test]
    fn test_tree_layout() {
        let dir = TestDir::new();
        let db = GraphDb::open(dir.graph_file(), false).unwrap();
        let mut tx = db.begin().unwrap();
        let (abies, _) = usage(&mut tx, Label::Taxon, "Abies", Rank::Genus);
        let (alba, alba_name) = usage(&mut tx, Label::Taxon, "Abies alba", Rank::Species);
        let (picea, picea_name) = usage(&mut tx, Label::Synonym, "Pinus picea", Rank::Species);
        tx.create_edge(abies, alba, RelType::ParentOf, EdgeProps::default()).unwrap();
        tx.create_edge(picea, alba, RelType::SynonymOf, EdgeProps::default()).unwrap();
        tx.create_edge(alba_name, picea_name, RelType::HasBasionym, EdgeProps::default()).unwrap();

        let mut out = Vec::new();
        print_tree(&tx, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Abies [genus]\n  Abies alba [species]\n    =$Pinus picea [species]\n"
        );
    }

    #[test]
    fn test_dot_lists_nodes_and_edges() {
        let dir = TestDir::new();
        let db = GraphDb::open(dir.graph_file(), false).unwrap();
        let mut tx = db.begin().unwrap();
        let (u, n) = usage(&mut tx, Label::Taxon, "Abies", Rank::Genus);

        let mut out = Vec::new();
        print_dot(&tx, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph G {"));
        assert!(text.contains(&format!("{u} -> {n} [label=\"HAS_NAME\"]")));
        assert!(text.contains("Abies [genus]"));
        assert!(text.trim_end().ends_with('}'));
    }
}
