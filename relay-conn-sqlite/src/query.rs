use r2d2_sqlite::rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// A SQL fragment with its positional (`?`) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Condition {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// A pending `SELECT`, the accessor of [`crate::SqliteConnector`].
///
/// Callers describe what to select and filter; the connector adds cursor
/// comparisons, the ordering and the LIMIT/OFFSET window.
///
/// ```ignore
/// let query = SqliteQuery::table("posts")
///     .select(["id", "title", "score"])
///     .filter("published = ?", vec![1.into()]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SqliteQuery {
    from: String,
    columns: Vec<String>,
    filters: Vec<Condition>,
    group_by: Vec<String>,
    having: Vec<Condition>,
    order_by: Vec<String>,
    offset: usize,
    limit: Option<usize>,
}

impl SqliteQuery {
    /// Starts a query over a table, or any FROM clause including joins.
    pub fn table(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            columns: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    /// Result columns. Each result column name must match a node field.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        self.filters.push(Condition::new(sql, params));
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn having(mut self, sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        self.having.push(Condition::new(sql, params));
        self
    }

    pub(crate) fn push_filter(&mut self, condition: Condition) {
        self.filters.push(condition);
    }

    pub(crate) fn push_having(&mut self, condition: Condition) {
        self.having.push(condition);
    }

    pub(crate) fn set_order_by(&mut self, order_by: Vec<String>) {
        self.order_by = order_by;
    }

    pub(crate) fn skip(&mut self, amount: usize) {
        self.offset += amount;
        self.limit = self.limit.map(|limit| limit.saturating_sub(amount));
    }

    pub(crate) fn set_limit(&mut self, limit: usize) {
        self.limit = Some(self.limit.map_or(limit, |current| current.min(limit)));
    }

    /// Renders the statement and its parameters in placeholder order.
    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut params = Vec::new();
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, self.from);

        if !self.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&join_conditions(&self.filters, &mut params));
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&join_conditions(&self.having, &mut params));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        // LIMIT -1 is sqlite for "no limit"
        let limit = self.limit.map_or(-1, |limit| limit as i64);
        sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, self.offset));

        (sql, params)
    }
}

fn join_conditions(conditions: &[Condition], params: &mut Vec<SqlValue>) -> String {
    conditions
        .iter()
        .map(|condition| {
            params.extend(condition.params.iter().cloned());
            format!("({})", condition.sql)
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Converts a cursor value into a bound parameter.
pub(crate) fn json_to_sql(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s),
        Value::Array(items) => match bytes(&items) {
            Some(blob) => SqlValue::Blob(blob),
            None => SqlValue::Text(Value::Array(items).to_string()),
        },
        other => SqlValue::Text(other.to_string()),
    }
}

fn bytes(items: &[Value]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

/// Accepts plain or dot-qualified identifiers: `[A-Za-z_][A-Za-z0-9_.]*`.
pub(crate) fn validate_column_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    !name.ends_with('.')
        && !name.contains("..")
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Double-quotes each part of a possibly qualified identifier.
pub(crate) fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
