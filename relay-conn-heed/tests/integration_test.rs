use std::sync::Arc;

use anyhow::Result;
use relay_conn::{connection_builder, Args, ConnectionBuilder, ConnectionError, Options};
use relay_conn_heed::{HeedConnector, HeedStore, KeyRange};
use relay_conn_test_suite::{cursor_for, run_all_tests, Item, TestCaseRunner, TestSuiteRunner};
use tempfile::TempDir;

struct HeedTestRunner;

struct HeedCaseRunner {
    builder: ConnectionBuilder<HeedConnector<Item>>,
    _dir: TempDir,
}

impl TestCaseRunner for HeedCaseRunner {
    type Connector = HeedConnector<Item>;

    fn builder(&self) -> &ConnectionBuilder<Self::Connector> {
        &self.builder
    }

    fn accessor(&self) -> KeyRange {
        KeyRange::all()
    }
}

fn open_store(items: &[Item]) -> Result<(TempDir, Arc<HeedStore>)> {
    let dir = TempDir::new()?;
    let store = HeedStore::open(dir.path().join("test_db"), None)?;
    let entries = items
        .iter()
        .map(|item| Ok((u64::try_from(item.id)?, item)))
        .collect::<Result<Vec<_>>>()?;
    store.put_all(entries)?;
    Ok((dir, Arc::new(store)))
}

impl TestSuiteRunner for HeedTestRunner {
    type CaseRunner = HeedCaseRunner;

    const ORDERS_BY_ANY_COLUMN: bool = false;

    fn create(&self, items: &[Item]) -> Result<Self::CaseRunner> {
        let (dir, store) = open_store(items)?;
        Ok(HeedCaseRunner {
            builder: connection_builder(HeedConnector::new(store)),
            _dir: dir,
        })
    }
}

#[tokio::test]
async fn test_all_heed() -> Result<()> {
    run_all_tests(HeedTestRunner).await
}

#[tokio::test]
async fn test_rejects_non_key_ordering() -> Result<()> {
    let (_dir, store) = open_store(&Item::seed(3))?;
    let builder = connection_builder(HeedConnector::<Item>::new(store));

    let err = builder
        .paginate(
            KeyRange::all(),
            Args::default().with_order_by("score"),
            &Options::default(),
        )
        .await;
    assert!(matches!(err, Err(ConnectionError::InvalidArgument(_))));
    Ok(())
}

#[tokio::test]
async fn test_caller_range_is_respected() -> Result<()> {
    use std::ops::Bound::{Excluded, Included};

    let (_dir, store) = open_store(&Item::seed(20))?;
    let builder = connection_builder(HeedConnector::<Item>::new(store));
    let range = KeyRange::between(Included(5), Excluded(15));

    let conn = builder
        .paginate(
            range,
            Args::default().with_after(cursor_for(12)),
            &Options::default(),
        )
        .await?;
    let ids: Vec<i64> = conn.edges.iter().map(|e| e.node.id).collect();
    assert_eq!(ids, vec![13, 14]);
    assert!(conn.page_info.has_previous_page);
    assert!(!conn.page_info.has_next_page);

    // A cursor below the range leaves it untouched.
    let conn = builder
        .paginate(
            range,
            Args::default().with_after(cursor_for(1)).with_first(2),
            &Options::default(),
        )
        .await?;
    assert_eq!(conn.total_count, Some(10));
    assert_eq!(conn.edges[0].node, Item::new(5));
    Ok(())
}

#[tokio::test]
async fn test_deleted_nodes_drop_out() -> Result<()> {
    let (_dir, store) = open_store(&Item::seed(5))?;
    assert!(store.delete(3)?);
    assert_eq!(store.get::<Item>(4)?, Some(Item::new(4)));
    let builder = connection_builder(HeedConnector::<Item>::new(store));

    let conn = builder
        .paginate(KeyRange::all(), Args::default().with_last(3), &Options::default())
        .await?;
    let ids: Vec<i64> = conn.edges.iter().map(|e| e.node.id).collect();
    assert_eq!(ids, vec![2, 4, 5]);
    assert_eq!(conn.total_count, Some(4));
    assert!(conn.page_info.has_previous_page);
    Ok(())
}
