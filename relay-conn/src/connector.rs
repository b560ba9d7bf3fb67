//! The capability set a backend implements so the connection algorithm can
//! paginate over it.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::args::{OrderDirection, PageArgs};
use crate::connection::Edge;
use crate::cursor::{decode_cursor, node_cursor};
use crate::ConnectionResult;

pub(crate) type FormatColumnFn = dyn Fn(&str) -> String + Send + Sync;
pub(crate) type IsAggregateFn = dyn Fn(&str) -> bool + Send + Sync;

/// Ordering information handed to every connector operation.
///
/// Column names in [`PageArgs::order_by`] are logical names: the ones nodes
/// serialize with and cursors are built from. [`OrderContext::column`] maps
/// them to the physical names a backend compares on.
#[derive(Clone, Copy)]
pub struct OrderContext<'a> {
    args: &'a PageArgs,
    format_column: Option<&'a FormatColumnFn>,
    is_aggregate: Option<&'a IsAggregateFn>,
}

impl<'a> OrderContext<'a> {
    pub fn new(args: &'a PageArgs) -> Self {
        Self {
            args,
            format_column: None,
            is_aggregate: None,
        }
    }

    pub(crate) fn with_hooks(
        args: &'a PageArgs,
        format_column: Option<&'a FormatColumnFn>,
        is_aggregate: Option<&'a IsAggregateFn>,
    ) -> Self {
        Self {
            args,
            format_column,
            is_aggregate,
        }
    }

    pub fn args(&self) -> &'a PageArgs {
        self.args
    }

    pub fn order_by(&self) -> &'a [String] {
        &self.args.order_by
    }

    pub fn direction(&self) -> OrderDirection {
        self.args.order_direction
    }

    /// Physical name of a logical column.
    pub fn column(&self, logical: &str) -> String {
        match self.format_column {
            Some(format) => format(logical),
            None => logical.to_string(),
        }
    }

    /// Whether the caller supplied a column mapping. Backends that splice
    /// column names into queries only trust names produced by one.
    pub fn has_column_format(&self) -> bool {
        self.format_column.is_some()
    }

    /// Physical names of all order columns, in order.
    pub fn columns(&self) -> Vec<String> {
        self.order_by().iter().map(|c| self.column(c)).collect()
    }

    /// Whether a logical column is an aggregate expression that can only be
    /// compared after grouping.
    pub fn is_aggregate(&self, logical: &str) -> bool {
        self.is_aggregate.is_some_and(|f| f(logical))
    }

    pub fn any_aggregate(&self) -> bool {
        self.order_by().iter().any(|c| self.is_aggregate(c))
    }

    /// Decodes a cursor produced under this ordering.
    pub fn decode_cursor(&self, cursor: &str) -> ConnectionResult<Vec<Value>> {
        decode_cursor(cursor, self.order_by())
    }
}

/// Operations on an ordered, not-yet-materialized collection.
///
/// The accessor is threaded through the algorithm by value: every narrowing
/// call consumes it and returns the narrowed handle. Narrowing is monotonic,
/// a second cursor trim never widens the range left by the first.
///
/// # Optional capabilities
///
/// `has_length_greater_than`, `convert_nodes_to_edges` and `order_nodes_by`
/// have default bodies. A connector whose `has_length_greater_than` is cheaper
/// than counting sets [`Connector::HAS_LENGTH_PROBE`]; otherwise the builder
/// answers it from the length it already computed. A connector that can tell
/// whether items lie beyond the `before`/`after` cursors sets
/// [`Connector::PROBES_BEYOND_CURSORS`].
///
/// The async operations must not block the executor. Backends over blocking
/// drivers run that work on `tokio::task::spawn_blocking`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Handle to the pending collection, e.g. a query or a key range.
    type Accessor: Clone + Send + Sync;
    /// Materialized item.
    type Node: Serialize + Send;

    const HAS_LENGTH_PROBE: bool = false;
    const PROBES_BEYOND_CURSORS: bool = false;

    /// Keeps only the items strictly after `cursor`.
    fn remove_nodes_before_and_including(
        &self,
        accessor: Self::Accessor,
        cursor: &str,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Self::Accessor>;

    /// Keeps only the items strictly before `cursor`.
    fn remove_nodes_after_and_including(
        &self,
        accessor: Self::Accessor,
        cursor: &str,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Self::Accessor>;

    /// Number of items reachable through the accessor.
    async fn get_nodes_length(
        &self,
        accessor: &Self::Accessor,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<usize>;

    async fn has_length_greater_than(
        &self,
        accessor: &Self::Accessor,
        amount: usize,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<bool> {
        Ok(self.get_nodes_length(accessor, ctx).await? > amount)
    }

    /// Drops the last `amount` items.
    async fn remove_nodes_from_end(
        &self,
        accessor: Self::Accessor,
        amount: usize,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Self::Accessor>;

    /// Drops the first `amount` items.
    async fn remove_nodes_from_beginning(
        &self,
        accessor: Self::Accessor,
        amount: usize,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Self::Accessor>;

    /// Materializes the accessor, preserving order.
    async fn fetch_nodes(
        &self,
        accessor: Self::Accessor,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<Self::Node>>;

    /// Materializes the accessor into edges. By default each cursor encodes
    /// the node's order column values.
    async fn convert_nodes_to_edges(
        &self,
        accessor: Self::Accessor,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<Edge<Self::Node>>> {
        let nodes = self.fetch_nodes(accessor, ctx).await?;
        nodes
            .into_iter()
            .map(|node| {
                let cursor = node_cursor(&node, ctx.order_by())?;
                Ok(Edge::new(node, cursor))
            })
            .collect()
    }

    /// Applies the requested ordering. Connectors over pre-sorted data keep
    /// the default, which leaves the accessor untouched.
    fn order_nodes_by(
        &self,
        accessor: Self::Accessor,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Self::Accessor> {
        Ok(accessor)
    }
}
