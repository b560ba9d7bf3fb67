use relay_conn::encode_cursor;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Node type every connector under test stores and returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub score: i64,
    /// Missing on every third item.
    pub rank: Option<i64>,
}

impl Item {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: format!("item-{id}"),
            score: (id * 7) % 5,
            rank: (id % 3 != 0).then_some(10 - id),
        }
    }

    /// Items with ids `1..=n`.
    pub fn seed(n: i64) -> Vec<Self> {
        (1..=n).map(Self::new).collect()
    }
}

/// Cursor of the item with `id` under the default `id` ordering.
pub fn cursor_for(id: i64) -> String {
    encode_cursor(&[json!(id)]).expect("integer cursors always encode")
}
