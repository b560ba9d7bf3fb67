//! The Relay connection algorithm and its result types.
//!
//! See: https://relay.dev/graphql/connections.htm

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::args::{Args, OrderBy, OrderDirection, DEFAULT_ORDER_COLUMN};
use crate::connector::{Connector, FormatColumnFn, IsAggregateFn, OrderContext};
use crate::ConnectionResult;

/// A node together with its cursor.
///
/// `metadata` is filled by [`Options::with_modify_edge_fn`] and serializes as
/// sibling fields of `node` and `cursor`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge<N> {
    pub node: N,
    pub cursor: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl<N> Edge<N> {
    pub fn new(node: N, cursor: String) -> Self {
        Self {
            node,
            cursor,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// See: https://relay.dev/graphql/connections.htm#sec-PageInfo
///
/// `start_cursor` and `end_cursor` are `None` when the page has no edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_previous_page: bool,
    pub has_next_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<N> {
    pub edges: Vec<Edge<N>>,
    pub page_info: PageInfo,
    /// Items left after `before`/`after`, ignoring `first`/`last`. `None`
    /// when the count was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

type ModifyEdgeFn<N> = dyn Fn(Edge<N>) -> Edge<N> + Send + Sync;

/// Per-call pagination options.
pub struct Options<N> {
    pub(crate) format_column_fn: Option<Arc<FormatColumnFn>>,
    pub(crate) modify_edge_fn: Option<Arc<ModifyEdgeFn<N>>>,
    pub(crate) is_aggregate_fn: Option<Arc<IsAggregateFn>>,
    pub skip_total_count: bool,
    pub(crate) legacy_order_column: Option<OrderBy>,
    pub(crate) legacy_asc_or_desc: Option<OrderDirection>,
    pub(crate) unique_column: String,
}

impl<N> Options<N> {
    /// Maps a logical column name to the physical name connectors compare on.
    pub fn with_format_column_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.format_column_fn = Some(Arc::new(f));
        self
    }

    /// Post-processes every edge, in order, after conversion.
    pub fn with_modify_edge_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(Edge<N>) -> Edge<N> + Send + Sync + 'static,
    {
        self.modify_edge_fn = Some(Arc::new(f));
        self
    }

    /// Marks logical columns that are aggregate expressions.
    pub fn with_is_aggregate_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.is_aggregate_fn = Some(Arc::new(f));
        self
    }

    /// Column whose values are unique per node, appended to every ordering
    /// that does not already include it so cursor positions never tie.
    /// Defaults to `id`.
    pub fn with_unique_column(mut self, column: impl Into<String>) -> Self {
        self.unique_column = column.into();
        self
    }

    pub fn with_skip_total_count(mut self, skip: bool) -> Self {
        self.skip_total_count = skip;
        self
    }

    #[deprecated(note = "use `Args::order_by` instead")]
    pub fn order_column(mut self, column: impl Into<OrderBy>) -> Self {
        self.legacy_order_column = Some(column.into());
        self
    }

    #[deprecated(note = "use `Args::order_direction` instead")]
    pub fn asc_or_desc(mut self, direction: OrderDirection) -> Self {
        self.legacy_asc_or_desc = Some(direction);
        self
    }
}

impl<N> Default for Options<N> {
    fn default() -> Self {
        Self {
            format_column_fn: None,
            modify_edge_fn: None,
            is_aggregate_fn: None,
            skip_total_count: false,
            legacy_order_column: None,
            legacy_asc_or_desc: None,
            unique_column: DEFAULT_ORDER_COLUMN.to_string(),
        }
    }
}

impl<N> Clone for Options<N> {
    fn clone(&self) -> Self {
        Self {
            format_column_fn: self.format_column_fn.clone(),
            modify_edge_fn: self.modify_edge_fn.clone(),
            is_aggregate_fn: self.is_aggregate_fn.clone(),
            skip_total_count: self.skip_total_count,
            legacy_order_column: self.legacy_order_column.clone(),
            legacy_asc_or_desc: self.legacy_asc_or_desc,
            unique_column: self.unique_column.clone(),
        }
    }
}

impl<N> fmt::Debug for Options<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("format_column_fn", &self.format_column_fn.is_some())
            .field("modify_edge_fn", &self.modify_edge_fn.is_some())
            .field("is_aggregate_fn", &self.is_aggregate_fn.is_some())
            .field("skip_total_count", &self.skip_total_count)
            .field("order_column", &self.legacy_order_column)
            .field("asc_or_desc", &self.legacy_asc_or_desc)
            .field("unique_column", &self.unique_column)
            .finish()
    }
}

/// Binds a [`Connector`] once and paginates its accessors.
pub struct ConnectionBuilder<C> {
    connector: C,
}

pub fn connection_builder<C: Connector>(connector: C) -> ConnectionBuilder<C> {
    ConnectionBuilder::new(connector)
}

impl<C: Connector> ConnectionBuilder<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Runs the connection algorithm over `accessor`.
    ///
    /// Steps run strictly in order, each awaiting the previous one:
    /// ordering, `after`, `before`, total count, page flags, `first`, `last`,
    /// edge conversion. The filtered length is computed at most once and only
    /// when a step needs it.
    pub async fn paginate(
        &self,
        accessor: C::Accessor,
        args: Args,
        opts: &Options<C::Node>,
    ) -> ConnectionResult<Connection<C::Node>> {
        let args = args.normalize(opts)?;
        let ctx = OrderContext::with_hooks(
            &args,
            opts.format_column_fn.as_deref(),
            opts.is_aggregate_fn.as_deref(),
        );
        let connector = &self.connector;

        let ordered = connector.order_nodes_by(accessor, &ctx)?;
        let unbounded = C::PROBES_BEYOND_CURSORS.then(|| ordered.clone());

        let mut nodes = ordered;
        if let Some(after) = &args.after {
            nodes = connector.remove_nodes_before_and_including(nodes, after, &ctx)?;
        }
        if let Some(before) = &args.before {
            nodes = connector.remove_nodes_after_and_including(nodes, before, &ctx)?;
        }

        let mut length = None;
        let total_count = if opts.skip_total_count {
            None
        } else {
            Some(self.length(&nodes, &ctx, &mut length).await?)
        };

        let exceeds_first = match args.first {
            Some(first) => self.exceeds(&nodes, first, &ctx, &mut length).await?,
            None => false,
        };
        let exceeds_last = match args.last {
            Some(last) => self.exceeds(&nodes, last, &ctx, &mut length).await?,
            None => false,
        };

        // Without `first`, items following `before` mean there is a next page;
        // without `last`, items preceding `after` mean a previous one. Both are
        // only asked when the filtered range itself is non-empty.
        let probe_before = args.before.as_ref().filter(|_| args.first.is_none());
        let probe_after = args.after.as_ref().filter(|_| args.last.is_none());
        let mut follows_before = false;
        let mut precedes_after = false;
        if let Some(unbounded) = &unbounded {
            if (probe_before.is_some() || probe_after.is_some())
                && self.exceeds(&nodes, 0, &ctx, &mut length).await?
            {
                if let Some(before) = probe_before {
                    let beyond = connector.remove_nodes_before_and_including(
                        unbounded.clone(),
                        before,
                        &ctx,
                    )?;
                    follows_before = connector.has_length_greater_than(&beyond, 0, &ctx).await?;
                }
                if let Some(after) = probe_after {
                    let beyond = connector.remove_nodes_after_and_including(
                        unbounded.clone(),
                        after,
                        &ctx,
                    )?;
                    precedes_after = connector.has_length_greater_than(&beyond, 0, &ctx).await?;
                }
            }
        }

        let has_next_page = exceeds_first || follows_before;
        let has_previous_page = exceeds_last || precedes_after;

        tracing::debug!(
            first = ?args.first,
            last = ?args.last,
            length = ?length,
            has_next_page,
            has_previous_page,
            "connection window resolved"
        );

        // Length of `nodes` once `first` has cut it down.
        let mut window = None;
        if let (Some(first), true) = (args.first, exceeds_first) {
            // The existence check and the count may disagree when rows vanish in between.
            let len = self.length(&nodes, &ctx, &mut length).await?;
            let excess = len.saturating_sub(first);
            if excess > 0 {
                nodes = connector.remove_nodes_from_end(nodes, excess, &ctx).await?;
            }
            window = Some(first.min(len));
        }
        if let (Some(last), true) = (args.last, exceeds_last) {
            let remaining = match window {
                Some(window) => window,
                None => self.length(&nodes, &ctx, &mut length).await?,
            };
            if last < remaining {
                nodes = connector
                    .remove_nodes_from_beginning(nodes, remaining - last, &ctx)
                    .await?;
            }
        }

        let mut edges = connector.convert_nodes_to_edges(nodes, &ctx).await?;
        if let Some(modify) = &opts.modify_edge_fn {
            edges = edges.into_iter().map(|edge| modify(edge)).collect();
        }

        let page_info = PageInfo {
            has_previous_page,
            has_next_page,
            start_cursor: edges.first().map(|edge| edge.cursor.clone()),
            end_cursor: edges.last().map(|edge| edge.cursor.clone()),
        };

        Ok(Connection {
            edges,
            page_info,
            total_count,
        })
    }

    async fn length(
        &self,
        nodes: &C::Accessor,
        ctx: &OrderContext<'_>,
        cache: &mut Option<usize>,
    ) -> ConnectionResult<usize> {
        if let Some(len) = *cache {
            return Ok(len);
        }
        let len = self.connector.get_nodes_length(nodes, ctx).await?;
        *cache = Some(len);
        Ok(len)
    }

    /// Whether more than `amount` items remain. Uses the connector's probe
    /// unless the length is already known.
    async fn exceeds(
        &self,
        nodes: &C::Accessor,
        amount: usize,
        ctx: &OrderContext<'_>,
        cache: &mut Option<usize>,
    ) -> ConnectionResult<bool> {
        match *cache {
            None if C::HAS_LENGTH_PROBE => {
                self.connector
                    .has_length_greater_than(nodes, amount, ctx)
                    .await
            }
            _ => Ok(self.length(nodes, ctx, cache).await? > amount),
        }
    }
}
