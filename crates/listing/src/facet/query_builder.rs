//! Listing queries and their SQL rendering.
//!
//! `ListingQuery` is the storage-agnostic request handed to a repository.
//! `PostgresListingQuery` renders it with SeaQuery against the `item` table,
//! where field values live in a JSONB `fields` column and term assignments
//! are JSONB arrays of term ids keyed by taxonomy.

use sea_query::{
    Alias, Asterisk, Cond, Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::predicate::{Condition, PredicateLeaf, PredicateNode};
use super::types::{Combinator, SortDirection, SourceKind};
use crate::archive::ArchiveContext;

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSort {
    /// Column name (`created`, `title`, `id`) or `fields.<path>`.
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Default for ListingSort {
    fn default() -> Self {
        Self {
            field: "created".to_string(),
            direction: SortDirection::Desc,
        }
    }
}

/// A fully resolved listing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingQuery {
    pub predicate: PredicateNode,

    /// Archive scope the results inherit.
    #[serde(default)]
    pub scope: Option<ArchiveContext>,

    /// Restrict to one item type.
    #[serde(default)]
    pub item_type: Option<String>,

    /// Restrict to these item ids.
    #[serde(default)]
    pub item_ids: Option<Vec<Uuid>>,

    #[serde(default)]
    pub sort: ListingSort,

    #[serde(default)]
    pub offset: u64,

    pub limit: u64,
}

impl ListingQuery {
    /// An unconstrained query for the first `limit` items.
    pub fn new(predicate: PredicateNode, limit: u64) -> Self {
        Self {
            predicate,
            scope: None,
            item_type: None,
            item_ids: None,
            sort: ListingSort::default(),
            offset: 0,
            limit,
        }
    }

    /// Set the slice.
    pub fn with_slice(mut self, offset: u64, limit: u64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// PostgreSQL rendering of a listing query.
pub struct PostgresListingQuery<'a> {
    query: &'a ListingQuery,
    base_table: String,
}

impl<'a> PostgresListingQuery<'a> {
    pub fn new(query: &'a ListingQuery) -> Self {
        Self {
            query,
            base_table: "item".to_string(),
        }
    }

    /// Target another base table.
    pub fn with_table(mut self, table: &str) -> Self {
        self.base_table = table.to_string();
        self
    }

    /// Build the SELECT for the query's slice.
    pub fn build(&self) -> String {
        let mut query = Query::select();
        query.column(Asterisk).from(Alias::new(&self.base_table));

        self.add_filters(&mut query);
        self.add_sort(&mut query);

        query.limit(self.query.limit);
        query.offset(self.query.offset);

        query.to_string(PostgresQueryBuilder)
    }

    /// Build a COUNT query for total results.
    pub fn build_count(&self) -> String {
        let mut query = Query::select();
        query.expr(Expr::col(Asterisk).count());
        query.from(Alias::new(&self.base_table));

        self.add_filters(&mut query);

        query.to_string(PostgresQueryBuilder)
    }

    fn add_filters(&self, query: &mut SelectStatement) {
        if let Some(expr) = self.node_expr(&self.query.predicate) {
            query.and_where(expr);
        }

        if let Some(scope) = &self.query.scope
            && let Some(expr) = self.scope_expr(scope)
        {
            query.and_where(expr);
        }

        if let Some(ref item_type) = self.query.item_type {
            query.and_where(self.column("type").eq(item_type));
        }

        if let Some(ref ids) = self.query.item_ids {
            if ids.is_empty() {
                query.and_where(Expr::cust("FALSE"));
            } else {
                let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
                query.and_where(self.column("id").is_in(ids));
            }
        }
    }

    fn node_expr(&self, node: &PredicateNode) -> Option<SimpleExpr> {
        match node {
            PredicateNode::Leaf(leaf) => self.leaf_expr(leaf),
            PredicateNode::Group {
                combinator,
                children,
            } => {
                let exprs: Vec<SimpleExpr> =
                    children.iter().filter_map(|c| self.node_expr(c)).collect();
                if exprs.is_empty() {
                    return None;
                }
                let cond = exprs.into_iter().fold(
                    match combinator {
                        Combinator::And => Cond::all(),
                        Combinator::Or => Cond::any(),
                    },
                    |cond, expr| cond.add(expr),
                );
                Some(cond.into())
            }
        }
    }

    fn leaf_expr(&self, leaf: &PredicateLeaf) -> Option<SimpleExpr> {
        match (&leaf.condition, leaf.kind) {
            (Condition::In { values }, SourceKind::Taxonomy) => {
                self.term_expr(&leaf.key, values)
            }
            (Condition::NotIn { values }, SourceKind::Taxonomy) => {
                self.term_expr(&leaf.key, values).map(|e| e.not())
            }
            (Condition::In { values }, _) => {
                Some(self.jsonb_extract_expr(&leaf.key).is_in(values.clone()))
            }
            (Condition::NotIn { values }, _) => {
                // Items without the field are not excluded.
                let field = self.jsonb_extract_expr(&leaf.key);
                Some(
                    Cond::any()
                        .add(field.clone().is_null())
                        .add(field.is_not_in(values.clone()))
                        .into(),
                )
            }
            (Condition::Between { min, max }, _) => Some(Expr::cust_with_values(
                format!(
                    "({})::numeric BETWEEN $1 AND $2",
                    self.jsonb_path_sql(&leaf.key)
                ),
                [*min, *max],
            )),
        }
    }

    /// Term assignment test; only well-formed UUIDs are inlined.
    fn term_expr(&self, taxonomy: &str, values: &[String]) -> Option<SimpleExpr> {
        let ids: Vec<String> = values
            .iter()
            .filter_map(|v| Uuid::parse_str(v).ok())
            .map(|u| format!("'{u}'"))
            .collect();
        if ids.is_empty() {
            return Some(Expr::cust("FALSE"));
        }
        Some(Expr::cust(format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements_text({}.fields->'{}') AS term(id) WHERE term.id IN ({}))",
            self.base_table,
            taxonomy,
            ids.join(", ")
        )))
    }

    fn scope_expr(&self, scope: &ArchiveContext) -> Option<SimpleExpr> {
        match scope {
            ArchiveContext::None | ArchiveContext::MainLoop => None,
            ArchiveContext::Author { author_id } => {
                Some(self.column("author_id").eq(author_id.to_string()))
            }
            ArchiveContext::TaxonomyTerm { taxonomy, term_id } => {
                self.term_expr(taxonomy, &[term_id.to_string()])
            }
            ArchiveContext::PostType { post_type } => Some(self.column("type").eq(post_type)),
            ArchiveContext::Search { query } => {
                let query = query.trim();
                if query.is_empty() {
                    return None;
                }
                Some(
                    self.column("title")
                        .like(format!("%{}%", escape_like_wildcards(query))),
                )
            }
            ArchiveContext::Singular { item_type, .. } => Some(self.column("type").eq(item_type)),
        }
    }

    fn add_sort(&self, query: &mut SelectStatement) {
        let sort = &self.query.sort;
        let order = match sort.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        if let Some(path) = sort.field.strip_prefix("fields.") {
            query.order_by_expr(self.jsonb_extract_expr(path), order);
        } else {
            query.order_by(
                (Alias::new(&self.base_table), Alias::new(&sort.field)),
                order,
            );
        }
    }

    fn column(&self, name: &str) -> Expr {
        Expr::col((Alias::new(&self.base_table), Alias::new(name)))
    }

    fn jsonb_extract_expr(&self, path: &str) -> SimpleExpr {
        Expr::cust(self.jsonb_path_sql(path))
    }

    /// Text extraction from JSONB: `fields->>'a'` or `(fields->'a')->>'b'`.
    fn jsonb_path_sql(&self, path: &str) -> String {
        let parts: Vec<&str> = path.split('.').collect();
        let mut expr = format!("{}.fields", self.base_table);
        for (i, part) in parts.iter().enumerate() {
            if i == parts.len() - 1 {
                expr = format!("({expr}->>'{part}')");
            } else {
                expr = format!("({expr}->'{part}')");
            }
        }
        expr
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
