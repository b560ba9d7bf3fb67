//! Relay pagination arguments and their normalized form.

use serde::{Deserialize, Serialize};

use crate::connection::Options;
use crate::{ConnectionError, ConnectionResult};

/// Default unique column, and the ordering when none is requested.
pub const DEFAULT_ORDER_COLUMN: &str = "id";

/// Sort direction of the connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending order (smallest to largest)
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    /// Descending order (largest to smallest)
    #[serde(alias = "DESC")]
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// `orderBy` as GraphQL clients send it: one column or a list of columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderBy {
    Column(String),
    Columns(Vec<String>),
}

impl OrderBy {
    pub fn into_columns(self) -> Vec<String> {
        match self {
            OrderBy::Column(column) => vec![column],
            OrderBy::Columns(columns) => columns,
        }
    }
}

impl From<&str> for OrderBy {
    fn from(column: &str) -> Self {
        OrderBy::Column(column.to_string())
    }
}

impl From<Vec<&str>> for OrderBy {
    fn from(columns: Vec<&str>) -> Self {
        OrderBy::Columns(columns.into_iter().map(str::to_string).collect())
    }
}

/// Connection arguments exactly as received from the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Args {
    pub before: Option<String>,
    pub after: Option<String>,
    pub first: Option<i64>,
    pub last: Option<i64>,
    pub order_by: Option<OrderBy>,
    pub order_direction: Option<OrderDirection>,
}

impl Args {
    pub fn with_first(mut self, first: i64) -> Self {
        self.first = Some(first);
        self
    }

    pub fn with_last(mut self, last: i64) -> Self {
        self.last = Some(last);
        self
    }

    pub fn with_after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub fn with_before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<OrderBy>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_order_direction(mut self, direction: OrderDirection) -> Self {
        self.order_direction = Some(direction);
        self
    }

    /// Folds the deprecated `order_column`/`asc_or_desc` options into the
    /// arguments and validates the result.
    ///
    /// A legacy `order_column` takes precedence over `orderBy`. The options'
    /// unique column is appended unless the ordering already names it. `first` and
    /// `last` must be non-negative, and may only be combined when `before` or
    /// `after` bounds the window.
    pub fn normalize<N>(self, opts: &Options<N>) -> ConnectionResult<PageArgs> {
        if opts.legacy_order_column.is_some() || opts.legacy_asc_or_desc.is_some() {
            tracing::warn!(
                "\"order_column\" and \"asc_or_desc\" are deprecated in favor of \"orderBy\" and \"orderDirection\""
            );
        }

        let (order_by, order_direction) = match opts.legacy_order_column.clone() {
            Some(column) => (
                column.into_columns(),
                opts.legacy_asc_or_desc.or(self.order_direction),
            ),
            None => (
                self.order_by
                    .map(OrderBy::into_columns)
                    .unwrap_or_else(|| vec![opts.unique_column.clone()]),
                self.order_direction.or(opts.legacy_asc_or_desc),
            ),
        };

        let mut order_by = order_by;
        if order_by.is_empty() || order_by.iter().any(|c| c.is_empty()) {
            return Err(ConnectionError::InvalidArgument(
                "`orderBy` must name at least one non-empty column".to_string(),
            ));
        }
        // Ties on the requested columns are broken by the unique column.
        if !order_by.contains(&opts.unique_column) {
            order_by.push(opts.unique_column.clone());
        }

        let first = count_arg("first", self.first)?;
        let last = count_arg("last", self.last)?;

        if first.is_some() && last.is_some() && self.before.is_none() && self.after.is_none() {
            return Err(ConnectionError::InvalidArgument(
                "`first` and `last` may only be combined with `before` or `after`".to_string(),
            ));
        }

        Ok(PageArgs {
            before: self.before,
            after: self.after,
            first,
            last,
            order_by,
            order_direction: order_direction.unwrap_or_default(),
        })
    }
}

fn count_arg(name: &str, value: Option<i64>) -> ConnectionResult<Option<usize>> {
    match value {
        None => Ok(None),
        Some(v) if v < 0 => Err(ConnectionError::InvalidArgument(format!(
            "`{name}` argument must not be less than 0"
        ))),
        Some(v) => usize::try_from(v).map(Some).map_err(|_| {
            ConnectionError::InvalidArgument(format!("`{name}` argument is too large"))
        }),
    }
}

/// Validated arguments the algorithm and connectors work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArgs {
    pub before: Option<String>,
    pub after: Option<String>,
    pub first: Option<usize>,
    pub last: Option<usize>,
    /// Never empty.
    pub order_by: Vec<String>,
    pub order_direction: OrderDirection,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(args: Args) -> ConnectionResult<PageArgs> {
        args.normalize(&Options::<()>::default())
    }

    #[test]
    fn test_defaults_to_id_ascending() {
        let page = normalize(Args::default()).unwrap();
        assert_eq!(page.order_by, vec!["id".to_string()]);
        assert_eq!(page.order_direction, OrderDirection::Asc);
        assert_eq!(page.first, None);
        assert_eq!(page.last, None);
    }

    #[test]
    fn test_deserializes_graphql_variables() {
        let args: Args = serde_json::from_str(
            r#"{"first": 3, "after": "abc", "orderBy": ["score", "id"], "orderDirection": "desc"}"#,
        )
        .unwrap();
        assert_eq!(args.first, Some(3));
        assert_eq!(args.after.as_deref(), Some("abc"));
        assert_eq!(args.order_by, Some(OrderBy::from(vec!["score", "id"])));
        assert_eq!(args.order_direction, Some(OrderDirection::Desc));

        let single: Args = serde_json::from_str(r#"{"orderBy": "name", "orderDirection": "ASC"}"#)
            .unwrap();
        assert_eq!(single.order_by, Some(OrderBy::from("name")));
        assert_eq!(single.order_direction, Some(OrderDirection::Asc));
    }

    #[test]
    fn test_negative_counts_rejected() {
        let err = normalize(Args::default().with_first(-1)).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidArgument(_)));
        let err = normalize(Args::default().with_last(-5)).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidArgument(_)));
    }

    #[test]
    fn test_first_and_last_need_a_bound() {
        let err = normalize(Args::default().with_first(2).with_last(1)).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidArgument(_)));

        let page = normalize(Args::default().with_first(2).with_last(1).with_after("c")).unwrap();
        assert_eq!(page.first, Some(2));
        assert_eq!(page.last, Some(1));
    }

    #[test]
    fn test_empty_order_by_rejected() {
        let err = normalize(Args::default().with_order_by(Vec::<&str>::new())).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidArgument(_)));
    }

    #[test]
    fn test_unique_column_breaks_ties() {
        let page = normalize(Args::default().with_order_by("score")).unwrap();
        assert_eq!(page.order_by, vec!["score".to_string(), "id".to_string()]);

        let page = normalize(Args::default().with_order_by(vec!["id", "score"])).unwrap();
        assert_eq!(page.order_by, vec!["id".to_string(), "score".to_string()]);

        let opts = Options::<()>::default().with_unique_column("uuid");
        let page = Args::default().with_order_by("score").normalize(&opts).unwrap();
        assert_eq!(page.order_by, vec!["score".to_string(), "uuid".to_string()]);

        let page = Args::default().normalize(&opts).unwrap();
        assert_eq!(page.order_by, vec!["uuid".to_string()]);
    }

    #[test]
    #[allow(deprecated)]
    fn test_legacy_options_take_precedence() {
        let opts = Options::<()>::default()
            .order_column("created_at")
            .asc_or_desc(OrderDirection::Desc);
        let page = Args::default()
            .with_order_by("name")
            .normalize(&opts)
            .unwrap();
        assert_eq!(page.order_by, vec!["created_at".to_string(), "id".to_string()]);
        assert_eq!(page.order_direction, OrderDirection::Desc);
    }
}
