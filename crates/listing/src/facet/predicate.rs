//! Filter predicate construction.
//!
//! Turns the selections of a request into a storage-agnostic predicate tree.
//! The tree is at most two levels deep below the root: the root group joins
//! one node per selected facet with the widget's parent logic, and an AND
//! facet with several values becomes a sub-group of single-value leaves.

use serde::{Deserialize, Serialize};

use super::types::{Combinator, FacetSpec, Selection, SelectionOperator, SourceKind};
use crate::archive::ArchiveContext;
use crate::repository::ContentItem;

/// Test applied to a facet's source on one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Any of the values is present.
    In { values: Vec<String> },
    /// None of the values is present.
    NotIn { values: Vec<String> },
    /// A numeric value lies within the inclusive range.
    Between { min: f64, max: f64 },
}

/// A single facet constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateLeaf {
    pub facet_id: String,
    pub kind: SourceKind,
    /// Taxonomy name or field path.
    pub key: String,
    pub condition: Condition,
}

/// Node of a predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum PredicateNode {
    Leaf(PredicateLeaf),
    Group {
        combinator: Combinator,
        children: Vec<PredicateNode>,
    },
}

impl PredicateNode {
    /// The empty root group, which matches every item.
    pub fn match_all() -> Self {
        PredicateNode::Group {
            combinator: Combinator::And,
            children: Vec::new(),
        }
    }

    /// Whether the node constrains nothing.
    pub fn is_match_all(&self) -> bool {
        matches!(self, PredicateNode::Group { children, .. } if children.is_empty())
    }

    /// Depth below this node (a leaf has depth 0).
    pub fn depth(&self) -> usize {
        match self {
            PredicateNode::Leaf(_) => 0,
            PredicateNode::Group { children, .. } => {
                1 + children.iter().map(PredicateNode::depth).max().unwrap_or(0)
            }
        }
    }

    /// All leaves in tree order.
    pub fn leaves(&self) -> Vec<&PredicateLeaf> {
        match self {
            PredicateNode::Leaf(leaf) => vec![leaf],
            PredicateNode::Group { children, .. } => {
                children.iter().flat_map(PredicateNode::leaves).collect()
            }
        }
    }

    /// Evaluate the predicate against an item.
    ///
    /// An empty group matches regardless of its combinator.
    pub fn matches(&self, item: &ContentItem) -> bool {
        match self {
            PredicateNode::Leaf(leaf) => leaf.matches(item),
            PredicateNode::Group { children, .. } if children.is_empty() => true,
            PredicateNode::Group {
                combinator: Combinator::And,
                children,
            } => children.iter().all(|c| c.matches(item)),
            PredicateNode::Group {
                combinator: Combinator::Or,
                children,
            } => children.iter().any(|c| c.matches(item)),
        }
    }
}

impl PredicateLeaf {
    /// Evaluate the leaf against an item.
    pub fn matches(&self, item: &ContentItem) -> bool {
        match &self.condition {
            Condition::In { values } => self.item_values(item).iter().any(|v| values.contains(v)),
            Condition::NotIn { values } => {
                !self.item_values(item).iter().any(|v| values.contains(v))
            }
            Condition::Between { min, max } => item
                .field_numbers(&self.key)
                .into_iter()
                .any(|n| n >= *min && n <= *max),
        }
    }

    fn item_values(&self, item: &ContentItem) -> Vec<String> {
        match self.kind {
            SourceKind::Taxonomy => item
                .term_ids(&self.key)
                .iter()
                .map(|id| id.to_string())
                .collect(),
            SourceKind::Field | SourceKind::NumericField => item.field_strings(&self.key),
        }
    }
}

/// Builds predicate trees from selections.
#[derive(Debug, Clone, Copy)]
pub struct PredicateBuilder<'a> {
    parent_logic: Combinator,
    archive: Option<&'a ArchiveContext>,
}

impl<'a> PredicateBuilder<'a> {
    /// Create a builder joining facets with `parent_logic`.
    pub fn new(parent_logic: Combinator) -> Self {
        Self {
            parent_logic,
            archive: None,
        }
    }

    /// Apply archive narrowing as a passive default selection.
    ///
    /// On a taxonomy term archive, a narrowing facet over the same taxonomy
    /// with no explicit selection behaves as if the archive's term were
    /// selected. An explicit selection for that facet wins.
    pub fn with_archive(mut self, context: &'a ArchiveContext) -> Self {
        self.archive = Some(context);
        self
    }

    /// Build the predicate tree.
    ///
    /// Facets are visited in declaration order. Selections for unknown
    /// facets, empty selections and facets with invalid keys are skipped.
    pub fn build(&self, selections: &[Selection], specs: &[FacetSpec]) -> PredicateNode {
        let effective = self.effective_selections(selections, specs);
        let children: Vec<PredicateNode> = specs
            .iter()
            .filter_map(|spec| {
                let selection = effective.iter().find(|s| s.facet_id == spec.id)?;
                facet_node(spec, selection)
            })
            .collect();

        tracing::debug!(
            facets = children.len(),
            logic = ?self.parent_logic,
            "predicate built"
        );

        PredicateNode::Group {
            combinator: self.parent_logic,
            children,
        }
    }

    /// Selections after archive narrowing defaults are applied.
    pub fn effective_selections(
        &self,
        selections: &[Selection],
        specs: &[FacetSpec],
    ) -> Vec<Selection> {
        let mut effective: Vec<Selection> =
            selections.iter().filter(|s| !s.is_empty()).cloned().collect();

        let Some((taxonomy, term_id)) = self.archive.and_then(ArchiveContext::term) else {
            return effective;
        };

        let narrowing = specs.iter().find(|spec| {
            spec.narrow_to_archive && spec.kind == SourceKind::Taxonomy && spec.key == taxonomy
        });
        if let Some(spec) = narrowing
            && !effective.iter().any(|s| s.facet_id == spec.id)
        {
            tracing::debug!(facet = %spec.id, term = %term_id, "archive term applied as default");
            effective.push(Selection {
                facet_id: spec.id.clone(),
                values: vec![term_id.to_string()],
                operator: SelectionOperator::In,
            });
        }
        effective
    }
}

/// Node for one facet's selection, or None when it contributes nothing.
fn facet_node(spec: &FacetSpec, selection: &Selection) -> Option<PredicateNode> {
    if selection.is_empty() {
        return None;
    }
    if !spec.has_valid_key() {
        tracing::warn!(facet = %spec.id, key = %spec.key, "invalid facet key; selection ignored");
        return None;
    }

    if spec.kind == SourceKind::NumericField {
        return numeric_node(spec, selection);
    }

    let leaf = |values: Vec<String>| {
        let condition = match selection.operator {
            SelectionOperator::In => Condition::In { values },
            SelectionOperator::NotIn => Condition::NotIn { values },
        };
        PredicateNode::Leaf(PredicateLeaf {
            facet_id: spec.id.clone(),
            kind: spec.kind,
            key: spec.key.clone(),
            condition,
        })
    };

    match spec.combinator {
        Combinator::Or => Some(leaf(selection.values.clone())),
        Combinator::And if selection.values.len() == 1 => Some(leaf(selection.values.clone())),
        Combinator::And => Some(PredicateNode::Group {
            combinator: Combinator::And,
            children: selection
                .values
                .iter()
                .map(|v| leaf(vec![v.clone()]))
                .collect(),
        }),
    }
}

/// A numeric selection is a range: `[min, max]`, or a single exact value.
fn numeric_node(spec: &FacetSpec, selection: &Selection) -> Option<PredicateNode> {
    let numbers: Vec<f64> = selection
        .values
        .iter()
        .filter_map(|v| v.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .take(2)
        .collect();

    let (min, max) = match numbers.as_slice() {
        [] => {
            tracing::warn!(facet = %spec.id, "numeric selection has no parseable bounds");
            return None;
        }
        [only] => (*only, *only),
        [a, b, ..] => (a.min(*b), a.max(*b)),
    };

    Some(PredicateNode::Leaf(PredicateLeaf {
        facet_id: spec.id.clone(),
        kind: spec.kind,
        key: spec.key.clone(),
        condition: Condition::Between { min, max },
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::facet::MatchMode;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn item(fields: serde_json::Value) -> ContentItem {
        ContentItem {
            id: Uuid::now_v7(),
            item_type: "product".into(),
            title: "Item".into(),
            author_id: Uuid::nil(),
            created: 0,
            fields,
            terms: BTreeMap::new(),
        }
    }

    #[test]
    fn no_selections_is_match_all() {
        let specs = vec![FacetSpec::new("color", SourceKind::Field, "color")];
        let tree = PredicateBuilder::new(Combinator::And).build(&[], &specs);
        assert!(tree.is_match_all());
        assert!(tree.matches(&item(serde_json::json!({}))));
    }

    #[test]
    fn or_facet_is_single_in_leaf() {
        let spec = FacetSpec::new("color", SourceKind::Field, "color");
        let sel = Selection::for_spec(&spec, ["red", "blue"]);
        let tree = PredicateBuilder::new(Combinator::And).build(&[sel], &[spec]);

        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(
            leaves[0].condition,
            Condition::In {
                values: vec!["red".into(), "blue".into()]
            }
        );
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn and_facet_is_sub_group() {
        let mut spec = FacetSpec::new("tags", SourceKind::Field, "tags");
        spec.combinator = Combinator::And;
        let sel = Selection::for_spec(&spec, ["a", "b"]);
        let tree = PredicateBuilder::new(Combinator::Or).build(&[sel], &[spec]);

        assert_eq!(tree.depth(), 2);
        let both = item(serde_json::json!({"tags": ["a", "b"]}));
        let one = item(serde_json::json!({"tags": ["a"]}));
        assert!(tree.matches(&both));
        assert!(!tree.matches(&one));
    }

    #[test]
    fn exclude_mode_is_not_in() {
        let mut spec = FacetSpec::new("color", SourceKind::Field, "color");
        spec.match_mode = MatchMode::Exclude;
        let sel = Selection::for_spec(&spec, ["red"]);
        let tree = PredicateBuilder::new(Combinator::And).build(&[sel], &[spec]);

        assert!(!tree.matches(&item(serde_json::json!({"color": "red"}))));
        assert!(tree.matches(&item(serde_json::json!({"color": "green"}))));
    }

    #[test]
    fn numeric_range_orders_bounds() {
        let spec = FacetSpec::new("price", SourceKind::NumericField, "price");
        let sel = Selection::for_spec(&spec, ["50", "10"]);
        let tree = PredicateBuilder::new(Combinator::And).build(&[sel], &[spec]);

        assert_eq!(
            tree.leaves()[0].condition,
            Condition::Between {
                min: 10.0,
                max: 50.0
            }
        );
        assert!(tree.matches(&item(serde_json::json!({"price": 25}))));
        assert!(!tree.matches(&item(serde_json::json!({"price": 75}))));
    }

    #[test]
    fn unparseable_numeric_selection_is_skipped() {
        let spec = FacetSpec::new("price", SourceKind::NumericField, "price");
        let sel = Selection::for_spec(&spec, ["cheap"]);
        let tree = PredicateBuilder::new(Combinator::And).build(&[sel], &[spec]);
        assert!(tree.is_match_all());
    }

    #[test]
    fn invalid_key_and_unknown_facet_skipped() {
        let bad = FacetSpec::new("bad", SourceKind::Field, "1;drop");
        let sel_bad = Selection::for_spec(&bad, ["x"]);
        let other = FacetSpec::new("other", SourceKind::Field, "other");
        let sel_other = Selection::for_spec(&other, ["y"]);

        let tree = PredicateBuilder::new(Combinator::And).build(&[sel_bad, sel_other], &[bad]);
        assert!(tree.is_match_all());
    }

    #[test]
    fn archive_term_is_default_selection() {
        let term = Uuid::now_v7();
        let mut spec = FacetSpec::new("topics", SourceKind::Taxonomy, "topics");
        spec.narrow_to_archive = true;
        let ctx = ArchiveContext::TaxonomyTerm {
            taxonomy: "topics".into(),
            term_id: term,
        };

        let tree = PredicateBuilder::new(Combinator::And)
            .with_archive(&ctx)
            .build(&[], std::slice::from_ref(&spec));
        assert_eq!(
            tree.leaves()[0].condition,
            Condition::In {
                values: vec![term.to_string()]
            }
        );

        let explicit = Uuid::now_v7().to_string();
        let sel = Selection::for_spec(&spec, [explicit.as_str()]);
        let tree = PredicateBuilder::new(Combinator::And)
            .with_archive(&ctx)
            .build(&[sel], &[spec]);
        assert_eq!(
            tree.leaves()[0].condition,
            Condition::In {
                values: vec![explicit]
            }
        );
    }

    #[test]
    fn archive_default_requires_narrowing_flag() {
        let spec = FacetSpec::new("topics", SourceKind::Taxonomy, "topics");
        let ctx = ArchiveContext::TaxonomyTerm {
            taxonomy: "topics".into(),
            term_id: Uuid::now_v7(),
        };
        let tree = PredicateBuilder::new(Combinator::And)
            .with_archive(&ctx)
            .build(&[], &[spec]);
        assert!(tree.is_match_all());
    }

    #[test]
    fn taxonomy_leaf_matches_term_ids() {
        let term = Uuid::now_v7();
        let spec = FacetSpec::new("topics", SourceKind::Taxonomy, "topics");
        let sel = Selection::for_spec(&spec, [term.to_string()]);
        let tree = PredicateBuilder::new(Combinator::And).build(&[sel], &[spec]);

        let mut tagged = item(serde_json::json!({}));
        tagged.terms.insert("topics".into(), vec![term]);
        assert!(tree.matches(&tagged));
        assert!(!tree.matches(&item(serde_json::json!({}))));
    }

    #[test]
    fn predicate_serializes_as_tagged_tree() {
        let spec = FacetSpec::new("color", SourceKind::Field, "color");
        let sel = Selection::for_spec(&spec, ["red"]);
        let tree = PredicateBuilder::new(Combinator::And).build(&[sel], &[spec]);

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["node"], "group");
        assert_eq!(json["combinator"], "AND");
        assert_eq!(json["children"][0]["node"], "leaf");
        assert_eq!(json["children"][0]["condition"]["op"], "in");
    }
}
