//! Pagination and ranking over compiled identifier sets.
//!
//! A page is a stable slice of the ordered result: the requested sort
//! column (or identifier order by default) with an identifier tiebreak, so
//! re-requesting a page over unchanged data returns identical rows. Scored
//! results order by descending weight and are normalized to percentage
//! scores in `[0, 100]`.

use crate::catalog::ParamValue;
use crate::lql::compiler::RESOURCES_TABLE;
use crate::lql::{Clause, ParameterizedStatement};

/// Requested page slice: `limit` rows starting after `offset`.
#[derive(Debug, Clone, Copy)]
pub struct PageWindow {
    pub limit: u32,
    pub offset: i64,
}

/// A sort property already resolved through the catalog to its column.
#[derive(Debug, Clone)]
pub struct ResolvedSort {
    pub column: String,
    pub ascending: bool,
}

/// Wraps a boolean clause into its ordered, sliced page statement.
pub fn page_statement(
    clause: &Clause,
    sort: Option<&ResolvedSort>,
    window: PageWindow,
) -> ParameterizedStatement {
    let mut params = clause.params().to_vec();
    let sql = match sort {
        Some(sort) => {
            let direction = if sort.ascending { "ASC" } else { "DESC" };
            format!(
                "SELECT r.id AS id FROM {RESOURCES_TABLE} r \
                 WHERE r.id IN (SELECT id FROM ({})) \
                 ORDER BY r.{} {direction}, r.id ASC LIMIT ? OFFSET ?",
                clause.sql(),
                sort.column
            )
        }
        None => format!(
            "SELECT id FROM ({}) ORDER BY id ASC LIMIT ? OFFSET ?",
            clause.sql()
        ),
    };
    params.push(ParamValue::Integer(window.limit as i64));
    params.push(ParamValue::Integer(window.offset));
    ParameterizedStatement { sql, params }
}

/// Wraps a scored clause into its descending-score page statement.
pub fn scored_page_statement(clause: &Clause, window: PageWindow) -> ParameterizedStatement {
    let mut params = clause.params().to_vec();
    let sql = format!(
        "SELECT id, weight FROM ({}) ORDER BY weight DESC, id ASC LIMIT ? OFFSET ?",
        clause.sql()
    );
    params.push(ParamValue::Integer(window.limit as i64));
    params.push(ParamValue::Integer(window.offset));
    ParameterizedStatement { sql, params }
}

/// The unpaged total over the same filtered set.
pub fn count_statement(clause: &Clause) -> ParameterizedStatement {
    ParameterizedStatement {
        sql: format!("SELECT COUNT(*) FROM ({})", clause.sql()),
        params: clause.params().to_vec(),
    }
}

/// The maximum raw match weight over the same filtered set, used to
/// normalize percentage scores.
pub fn max_weight_statement(clause: &Clause) -> ParameterizedStatement {
    ParameterizedStatement {
        sql: format!("SELECT MAX(weight) FROM ({})", clause.sql()),
        params: clause.params().to_vec(),
    }
}

/// Normalizes a raw match weight into a percentage of the maximum possible
/// weight, rounded to two decimal places and clamped into `[0, 100]`.
pub fn percentage(weight: f64, max_weight: f64) -> f64 {
    if max_weight <= f64::EPSILON {
        return 0.0;
    }
    let pct = (weight / max_weight * 100.0).clamp(0.0, 100.0);
    (pct * 100.0).round() / 100.0
}
