//! Connector over an in-memory vector of nodes.

use std::cmp::Ordering;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::args::OrderDirection;
use crate::connector::{Connector, OrderContext};
use crate::cursor::{compare_keys, node_key};
use crate::ConnectionResult;

/// Paginates a `Vec<N>`, reading order column values from each node's
/// serialized fields.
pub struct MemoryConnector<N> {
    _node: PhantomData<fn() -> N>,
}

impl<N> MemoryConnector<N> {
    pub fn new() -> Self {
        Self { _node: PhantomData }
    }
}

impl<N> Default for MemoryConnector<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn directed(ord: Ordering, direction: OrderDirection) -> Ordering {
    match direction {
        OrderDirection::Asc => ord,
        OrderDirection::Desc => ord.reverse(),
    }
}

/// Keeps the nodes whose position relative to `cursor` is `keep`.
fn retain_relative<N: Serialize>(
    nodes: Vec<N>,
    cursor: &str,
    ctx: &OrderContext<'_>,
    keep: Ordering,
) -> ConnectionResult<Vec<N>> {
    let cursor: Vec<Value> = ctx.decode_cursor(cursor)?;
    let mut kept = Vec::with_capacity(nodes.len());
    for node in nodes {
        let key = node_key(&node, ctx.order_by())?;
        if directed(compare_keys(&key, &cursor), ctx.direction()) == keep {
            kept.push(node);
        }
    }
    Ok(kept)
}

#[async_trait]
impl<N> Connector for MemoryConnector<N>
where
    N: Serialize + Clone + Send + Sync + 'static,
{
    type Accessor = Vec<N>;
    type Node = N;

    const PROBES_BEYOND_CURSORS: bool = true;

    fn remove_nodes_before_and_including(
        &self,
        accessor: Vec<N>,
        cursor: &str,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<N>> {
        retain_relative(accessor, cursor, ctx, Ordering::Greater)
    }

    fn remove_nodes_after_and_including(
        &self,
        accessor: Vec<N>,
        cursor: &str,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<N>> {
        retain_relative(accessor, cursor, ctx, Ordering::Less)
    }

    async fn get_nodes_length(
        &self,
        accessor: &Vec<N>,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<usize> {
        Ok(accessor.len())
    }

    async fn remove_nodes_from_end(
        &self,
        mut accessor: Vec<N>,
        amount: usize,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<N>> {
        accessor.truncate(accessor.len().saturating_sub(amount));
        Ok(accessor)
    }

    async fn remove_nodes_from_beginning(
        &self,
        mut accessor: Vec<N>,
        amount: usize,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<N>> {
        let amount = amount.min(accessor.len());
        Ok(accessor.split_off(amount))
    }

    async fn fetch_nodes(
        &self,
        accessor: Vec<N>,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<N>> {
        Ok(accessor)
    }

    fn order_nodes_by(
        &self,
        accessor: Vec<N>,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<N>> {
        let mut keyed = accessor
            .into_iter()
            .map(|node| Ok((node_key(&node, ctx.order_by())?, node)))
            .collect::<ConnectionResult<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| directed(compare_keys(a, b), ctx.direction()));
        Ok(keyed.into_iter().map(|(_, node)| node).collect())
    }
}
