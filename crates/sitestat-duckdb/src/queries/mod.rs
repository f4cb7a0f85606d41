pub mod counts;
pub mod events;
pub mod referrer;
pub mod requests;

use sitestat_core::stats::TimeWindow;
use sitestat_core::store::PageCursor;

use crate::backend::format_timestamp;

/// Append the window bounds on `created_at` as numbered parameters.
///
/// The lower bound is inclusive, the upper bound exclusive (midnight after the
/// end day), so whole calendar days are covered.
pub(crate) fn append_window_filter(
    window: &TimeWindow,
    filter_sql: &mut String,
    params: &mut Vec<Box<dyn duckdb::types::ToSql + Send>>,
    param_idx: &mut usize,
) {
    if let Some(lower) = window.lower_bound() {
        filter_sql.push_str(&format!(
            " AND created_at >= CAST(?{} AS TIMESTAMP)",
            *param_idx
        ));
        params.push(Box::new(format_timestamp(&lower)));
        *param_idx += 1;
    }
    if let Some(upper) = window.upper_bound() {
        filter_sql.push_str(&format!(
            " AND created_at < CAST(?{} AS TIMESTAMP)",
            *param_idx
        ));
        params.push(Box::new(format_timestamp(&upper)));
        *param_idx += 1;
    }
}

/// Append a strict `(created_at, id) > cursor` keyset condition.
pub(crate) fn append_cursor_filter(
    after: Option<&PageCursor>,
    filter_sql: &mut String,
    params: &mut Vec<Box<dyn duckdb::types::ToSql + Send>>,
    param_idx: &mut usize,
) {
    let Some(cursor) = after else {
        return;
    };
    let ts_idx = *param_idx;
    let id_idx = *param_idx + 1;
    filter_sql.push_str(&format!(
        " AND (created_at > CAST(?{ts_idx} AS TIMESTAMP) \
         OR (created_at = CAST(?{ts_idx} AS TIMESTAMP) AND id > ?{id_idx}))"
    ));
    params.push(Box::new(format_timestamp(&cursor.timestamp)));
    params.push(Box::new(cursor.id.clone()));
    *param_idx += 2;
}
