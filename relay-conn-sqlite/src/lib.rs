//! SQLite connector for relay-conn.
//!
//! The accessor is a [`SqliteQuery`]: nothing is read until the connection
//! algorithm asks for a length, an existence probe, or the final page.
//! Cursor trims become lexicographic comparisons on the order columns, so a
//! cursor `(score, id)` under ascending order adds
//! `("score" > ?) OR ("score" IS ? AND "id" > ?)` for `after`. NULL sorts
//! before every value, as it does in SQLite's own ORDER BY.
//!
//! Order column names coming from the client are validated and quoted.
//! Names produced by a caller-supplied `format_column_fn` are used as raw SQL
//! expressions, so that aggregates and qualified columns can be ordered on.
//!
//! Queries run on tokio's blocking pool, one pooled connection per call.

mod query;

pub use query::{Condition, SqliteQuery};

use std::marker::PhantomData;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::rusqlite::types::{FromSql, Value as SqlValue, ValueRef};
use r2d2_sqlite::rusqlite::{params_from_iter, Row};
use r2d2_sqlite::SqliteConnectionManager;
use relay_conn::{ConnectionError, ConnectionResult, Connector, OrderContext, OrderDirection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use query::{json_to_sql, quote_identifier, validate_column_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    After,
    Before,
}

/// Connector running [`SqliteQuery`] accessors against a connection pool.
pub struct SqliteConnector<N> {
    pool: Pool<SqliteConnectionManager>,
    _node: PhantomData<fn() -> N>,
}

impl<N> SqliteConnector<N> {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self {
            pool,
            _node: PhantomData,
        }
    }

    pub fn pool(&self) -> &Pool<SqliteConnectionManager> {
        &self.pool
    }

    /// Runs `f` with the pool on the blocking thread pool.
    async fn blocking<T, F>(&self, f: F) -> ConnectionResult<T>
    where
        F: FnOnce(&Pool<SqliteConnectionManager>) -> ConnectionResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || f(&pool))
            .await
            .map_err(ConnectionError::accessor)?
    }
}

fn query_scalar<T: FromSql>(
    pool: &Pool<SqliteConnectionManager>,
    sql: &str,
    params: Vec<SqlValue>,
) -> ConnectionResult<T> {
    tracing::trace!(sql = %sql, "sqlite connector scalar query");
    let conn = pool.get().map_err(ConnectionError::accessor)?;
    conn.query_row(sql, params_from_iter(params.iter()), |row| row.get(0))
        .map_err(ConnectionError::accessor)
}

fn count(pool: &Pool<SqliteConnectionManager>, query: &SqliteQuery) -> ConnectionResult<usize> {
    let (inner, params) = query.to_sql();
    let sql = format!("SELECT COUNT(*) FROM ({inner})");
    let count: i64 = query_scalar(pool, &sql, params)?;
    Ok(count as usize)
}

fn fetch<N: DeserializeOwned>(
    pool: &Pool<SqliteConnectionManager>,
    query: &SqliteQuery,
) -> ConnectionResult<Vec<N>> {
    let (sql, params) = query.to_sql();
    tracing::trace!(sql = %sql, "sqlite connector fetch");

    let conn = pool.get().map_err(ConnectionError::accessor)?;
    let mut stmt = conn.prepare(&sql).map_err(ConnectionError::accessor)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| row_to_json(row, &names))
        .map_err(ConnectionError::accessor)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(ConnectionError::accessor)?;

    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(ConnectionError::accessor))
        .collect()
}

/// SQL for the order columns. Client-supplied names must be plain or
/// qualified identifiers and are quoted; mapped names are trusted.
fn order_columns(ctx: &OrderContext<'_>) -> ConnectionResult<Vec<String>> {
    if ctx.has_column_format() {
        return Ok(ctx.columns());
    }
    ctx.order_by()
        .iter()
        .map(|column| {
            if !validate_column_name(column) {
                return Err(ConnectionError::InvalidArgument(format!(
                    "`{column}` is not a valid column name"
                )));
            }
            Ok(quote_identifier(column))
        })
        .collect()
}

/// Keeps the rows on `side` of the cursor. Expands to one clause per column
/// so that NULL values compare as the smallest value.
fn cursor_condition(
    values: &[Value],
    columns: &[String],
    direction: OrderDirection,
    side: Side,
) -> Condition {
    let greater = matches!(
        (side, direction),
        (Side::After, OrderDirection::Asc) | (Side::Before, OrderDirection::Desc)
    );

    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for (level, (column, value)) in columns.iter().zip(values).enumerate() {
        // nothing sorts below NULL
        if !greater && value.is_null() {
            continue;
        }

        let mut parts = Vec::with_capacity(level + 1);
        for (prefix, prefix_value) in columns.iter().zip(values).take(level) {
            parts.push(format!("{prefix} IS ?"));
            params.push(json_to_sql(prefix_value.clone()));
        }
        match (greater, value.is_null()) {
            (true, true) => parts.push(format!("{column} IS NOT NULL")),
            (true, false) => {
                parts.push(format!("{column} > ?"));
                params.push(json_to_sql(value.clone()));
            }
            _ => {
                parts.push(format!("({column} IS NULL OR {column} < ?)"));
                params.push(json_to_sql(value.clone()));
            }
        }
        clauses.push(format!("({})", parts.join(" AND ")));
    }

    if clauses.is_empty() {
        return Condition::new("0", Vec::new());
    }
    Condition::new(clauses.join(" OR "), params)
}

fn trim(
    mut query: SqliteQuery,
    cursor: &str,
    ctx: &OrderContext<'_>,
    side: Side,
) -> ConnectionResult<SqliteQuery> {
    let values = ctx.decode_cursor(cursor)?;
    let columns = order_columns(ctx)?;
    let condition = cursor_condition(&values, &columns, ctx.direction(), side);
    if ctx.any_aggregate() {
        query.push_having(condition);
    } else {
        query.push_filter(condition);
    }
    Ok(query)
}

/// BLOBs become arrays of byte values, which bind back as BLOBs and
/// deserialize into `Vec<u8>`.
fn row_to_json(row: &Row<'_>, names: &[String]) -> r2d2_sqlite::rusqlite::Result<Value> {
    let mut fields = Map::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Array(b.iter().map(|&byte| Value::from(byte)).collect()),
        };
        fields.insert(name.clone(), value);
    }
    Ok(Value::Object(fields))
}

#[async_trait]
impl<N> Connector for SqliteConnector<N>
where
    N: Serialize + DeserializeOwned + Send + 'static,
{
    type Accessor = SqliteQuery;
    type Node = N;

    const HAS_LENGTH_PROBE: bool = true;
    const PROBES_BEYOND_CURSORS: bool = true;

    fn remove_nodes_before_and_including(
        &self,
        accessor: SqliteQuery,
        cursor: &str,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<SqliteQuery> {
        trim(accessor, cursor, ctx, Side::After)
    }

    fn remove_nodes_after_and_including(
        &self,
        accessor: SqliteQuery,
        cursor: &str,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<SqliteQuery> {
        trim(accessor, cursor, ctx, Side::Before)
    }

    async fn get_nodes_length(
        &self,
        accessor: &SqliteQuery,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<usize> {
        let query = accessor.clone();
        self.blocking(move |pool| count(pool, &query)).await
    }

    async fn has_length_greater_than(
        &self,
        accessor: &SqliteQuery,
        amount: usize,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<bool> {
        let (inner, params) = accessor.to_sql();
        let sql = format!("SELECT EXISTS(SELECT 1 FROM ({inner}) LIMIT 1 OFFSET {amount})");
        let exists: i64 = self
            .blocking(move |pool| query_scalar(pool, &sql, params))
            .await?;
        Ok(exists != 0)
    }

    async fn remove_nodes_from_end(
        &self,
        mut accessor: SqliteQuery,
        amount: usize,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<SqliteQuery> {
        let query = accessor.clone();
        let len = self.blocking(move |pool| count(pool, &query)).await?;
        accessor.set_limit(len.saturating_sub(amount));
        Ok(accessor)
    }

    async fn remove_nodes_from_beginning(
        &self,
        mut accessor: SqliteQuery,
        amount: usize,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<SqliteQuery> {
        accessor.skip(amount);
        Ok(accessor)
    }

    async fn fetch_nodes(
        &self,
        accessor: SqliteQuery,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<N>> {
        self.blocking(move |pool| fetch(pool, &accessor)).await
    }

    fn order_nodes_by(
        &self,
        mut accessor: SqliteQuery,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<SqliteQuery> {
        let direction = ctx.direction().as_sql();
        accessor.set_order_by(
            order_columns(ctx)?
                .into_iter()
                .map(|column| format!("{column} {direction}"))
                .collect(),
        );
        Ok(accessor)
    }
}
