//! LMDB connector for relay-conn, using the heed crate.
//!
//! Nodes live in a single LMDB database keyed by their `u64` id, encoded
//! big-endian so that byte order matches numeric order. The accessor is a
//! [`KeyRange`]: cursor trims move its bounds, `first`/`last` move its
//! offset and limit, and nothing is read until the builder asks for a
//! count, a probe or the page itself.
//!
//! Only the key column can be ordered on, in either direction. Reads run
//! on tokio's blocking pool.

mod range;
mod store;

pub use range::KeyRange;
pub use store::{HeedStore, StoreError};

use std::marker::PhantomData;
use std::ops::Bound::{self, Excluded, Unbounded};
use std::sync::Arc;

use async_trait::async_trait;
use relay_conn::{ConnectionError, ConnectionResult, Connector, OrderContext, OrderDirection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Connector paginating [`KeyRange`]s of a [`HeedStore`].
pub struct HeedConnector<N> {
    store: Arc<HeedStore>,
    key_field: String,
    _node: PhantomData<fn() -> N>,
}

impl<N> HeedConnector<N> {
    /// Connector over nodes whose key is their `id` field.
    pub fn new(store: Arc<HeedStore>) -> Self {
        Self::with_key_field(store, "id")
    }

    pub fn with_key_field(store: Arc<HeedStore>, key_field: impl Into<String>) -> Self {
        Self {
            store,
            key_field: key_field.into(),
            _node: PhantomData,
        }
    }

    pub fn store(&self) -> &HeedStore {
        &self.store
    }

    /// Runs `f` with the store on the blocking thread pool.
    async fn blocking<T, F>(&self, f: F) -> ConnectionResult<T>
    where
        F: FnOnce(&HeedStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(ConnectionError::accessor)?
            .map_err(ConnectionError::accessor)
    }

    async fn count(&self, range: &KeyRange, cap: Option<usize>) -> ConnectionResult<usize> {
        tracing::trace!(?range, ?cap, "heed connector count");
        let range = *range;
        self.blocking(move |store| store.scan(&range, cap, |_, _| Ok(())))
            .await
    }
}

/// Bound keeping the keys strictly greater than `value`.
fn above(value: &Value) -> ConnectionResult<Bound<u64>> {
    if let Some(key) = value.as_u64() {
        return Ok(Excluded(key));
    }
    match value.as_f64() {
        Some(f) if f < 0.0 => Ok(Unbounded),
        Some(f) => Ok(Excluded(f.floor() as u64)),
        None => Err(not_a_key(value)),
    }
}

/// Bound keeping the keys strictly less than `value`.
fn below(value: &Value) -> ConnectionResult<Bound<u64>> {
    if let Some(key) = value.as_u64() {
        return Ok(Excluded(key));
    }
    match value.as_f64() {
        // Negative values saturate to `Excluded(0)`, which admits nothing.
        Some(f) => Ok(Excluded(f.ceil() as u64)),
        None => Err(not_a_key(value)),
    }
}

fn not_a_key(value: &Value) -> ConnectionError {
    ConnectionError::InvalidCursor(format!("expected a numeric key, got {value}"))
}

fn cursor_key(cursor: &str, ctx: &OrderContext<'_>) -> ConnectionResult<Value> {
    ctx.decode_cursor(cursor)?
        .into_iter()
        .next()
        .ok_or_else(|| ConnectionError::InvalidCursor("cursor holds no key".to_string()))
}

#[async_trait]
impl<N> Connector for HeedConnector<N>
where
    N: Serialize + DeserializeOwned + Send + 'static,
{
    type Accessor = KeyRange;
    type Node = N;

    const HAS_LENGTH_PROBE: bool = true;
    const PROBES_BEYOND_CURSORS: bool = true;

    fn remove_nodes_before_and_including(
        &self,
        mut range: KeyRange,
        cursor: &str,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<KeyRange> {
        let key = cursor_key(cursor, ctx)?;
        match ctx.direction() {
            OrderDirection::Asc => range.raise_lower(above(&key)?),
            OrderDirection::Desc => range.lower_upper(below(&key)?),
        }
        Ok(range)
    }

    fn remove_nodes_after_and_including(
        &self,
        mut range: KeyRange,
        cursor: &str,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<KeyRange> {
        let key = cursor_key(cursor, ctx)?;
        match ctx.direction() {
            OrderDirection::Asc => range.lower_upper(below(&key)?),
            OrderDirection::Desc => range.raise_lower(above(&key)?),
        }
        Ok(range)
    }

    async fn get_nodes_length(
        &self,
        range: &KeyRange,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<usize> {
        self.count(range, None).await
    }

    async fn has_length_greater_than(
        &self,
        range: &KeyRange,
        amount: usize,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<bool> {
        Ok(self.count(range, Some(amount.saturating_add(1))).await? > amount)
    }

    async fn remove_nodes_from_end(
        &self,
        mut range: KeyRange,
        amount: usize,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<KeyRange> {
        let len = self.count(&range, None).await?;
        range.set_limit(len.saturating_sub(amount));
        Ok(range)
    }

    async fn remove_nodes_from_beginning(
        &self,
        mut range: KeyRange,
        amount: usize,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<KeyRange> {
        range.skip(amount);
        Ok(range)
    }

    async fn fetch_nodes(
        &self,
        range: KeyRange,
        _ctx: &OrderContext<'_>,
    ) -> ConnectionResult<Vec<N>> {
        tracing::trace!(?range, "heed connector fetch");
        self.blocking(move |store| {
            let mut nodes = Vec::new();
            store.scan(&range, None, |_, json| {
                nodes.push(serde_json::from_str(json)?);
                Ok(())
            })?;
            Ok(nodes)
        })
        .await
    }

    fn order_nodes_by(
        &self,
        mut range: KeyRange,
        ctx: &OrderContext<'_>,
    ) -> ConnectionResult<KeyRange> {
        if !matches!(ctx.order_by(), [column] if *column == self.key_field) {
            return Err(ConnectionError::InvalidArgument(format!(
                "heed connector can only order by `{}`, got {:?}",
                self.key_field,
                ctx.order_by()
            )));
        }
        range.set_direction(ctx.direction());
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_cursor_bounds() {
        assert_eq!(above(&json!(4)).unwrap(), Excluded(4));
        assert_eq!(below(&json!(4)).unwrap(), Excluded(4));

        assert_eq!(above(&json!(-3)).unwrap(), Unbounded);
        assert_eq!(below(&json!(-3)).unwrap(), Excluded(0));

        // 2.5 sits between keys 2 and 3.
        assert_eq!(above(&json!(2.5)).unwrap(), Excluded(2));
        assert_eq!(below(&json!(2.5)).unwrap(), Excluded(3));

        assert!(matches!(
            above(&json!("4")),
            Err(ConnectionError::InvalidCursor(_))
        ));
    }
}
