mod item;

pub use item::{cursor_for, Item};

use relay_conn::{
    Args, Connection, ConnectionBuilder, ConnectionError, ConnectionResult, Connector, Edge,
    OrderDirection, Options,
};
use serde_json::{json, Value};

pub type AccessorOf<C> = <C as Connector>::Accessor;

pub trait TestCaseRunner {
    type Connector: Connector<Node = Item>;

    fn builder(&self) -> &ConnectionBuilder<Self::Connector>;

    /// A fresh accessor over every seeded item.
    fn accessor(&self) -> AccessorOf<Self::Connector>;

    fn paginate(
        &self,
        args: Args,
    ) -> impl std::future::Future<Output = ConnectionResult<Connection<Item>>> {
        self.paginate_with(args, Options::default())
    }

    fn paginate_with(
        &self,
        args: Args,
        opts: Options<Item>,
    ) -> impl std::future::Future<Output = ConnectionResult<Connection<Item>>> {
        let accessor = self.accessor();
        async move { self.builder().paginate(accessor, args, &opts).await }
    }
}

pub trait TestSuiteRunner {
    type CaseRunner: TestCaseRunner;

    /// Whether the connector can order on columns other than the key.
    const ORDERS_BY_ANY_COLUMN: bool = true;

    /// Creates an isolated collection holding `items`.
    fn create(&self, items: &[Item]) -> anyhow::Result<Self::CaseRunner>;
}

fn probes_beyond<R: TestSuiteRunner>() -> bool {
    <<R::CaseRunner as TestCaseRunner>::Connector as Connector>::PROBES_BEYOND_CURSORS
}

fn ids(conn: &Connection<Item>) -> Vec<i64> {
    conn.edges.iter().map(|e| e.node.id).collect()
}

/// Follows `end_cursor` from the start until `has_next_page` turns false.
async fn walk_forward<C: TestCaseRunner>(
    runner: &C,
    args: impl Fn() -> Args,
    first: i64,
) -> anyhow::Result<(Vec<i64>, usize)> {
    let mut seen = Vec::new();
    let mut after: Option<String> = None;
    let mut pages = 0;
    loop {
        let mut page_args = args().with_first(first);
        if let Some(cursor) = after.take() {
            page_args = page_args.with_after(cursor);
        }
        let conn = runner.paginate(page_args).await?;
        pages += 1;
        seen.extend(ids(&conn));
        if !conn.page_info.has_next_page {
            break;
        }
        after = conn.page_info.end_cursor;
        anyhow::ensure!(pages < 20, "forward walk does not terminate");
    }
    Ok((seen, pages))
}

pub async fn test_first_page<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing first page...");

    let runner = r.create(&Item::seed(10))?;
    let conn = runner.paginate(Args::default().with_first(3)).await?;

    assert_eq!(ids(&conn), vec![1, 2, 3]);
    assert!(conn.page_info.has_next_page);
    assert!(!conn.page_info.has_previous_page);
    assert_eq!(conn.total_count, Some(10));
    assert_eq!(conn.page_info.start_cursor, Some(cursor_for(1)));
    assert_eq!(conn.page_info.end_cursor, Some(cursor_for(3)));
    assert_eq!(conn.edges[1].node, Item::new(2));
    Ok(())
}

pub async fn test_after_cursor<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing after cursor...");

    let runner = r.create(&Item::seed(10))?;
    let conn = runner
        .paginate(Args::default().with_after(cursor_for(3)).with_first(3))
        .await?;

    assert_eq!(ids(&conn), vec![4, 5, 6]);
    assert!(conn.page_info.has_next_page);
    assert_eq!(conn.page_info.has_previous_page, probes_beyond::<R>());
    assert_eq!(conn.total_count, Some(7));
    Ok(())
}

pub async fn test_last_page<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing last page...");

    let runner = r.create(&Item::seed(10))?;
    let conn = runner.paginate(Args::default().with_last(3)).await?;

    assert_eq!(ids(&conn), vec![8, 9, 10]);
    assert!(conn.page_info.has_previous_page);
    assert!(!conn.page_info.has_next_page);
    assert_eq!(conn.total_count, Some(10));

    let conn = runner
        .paginate(Args::default().with_before(cursor_for(8)).with_last(3))
        .await?;
    assert_eq!(ids(&conn), vec![5, 6, 7]);
    assert!(conn.page_info.has_previous_page);
    assert_eq!(conn.page_info.has_next_page, probes_beyond::<R>());
    assert_eq!(conn.total_count, Some(7));
    Ok(())
}

pub async fn test_first_exceeds_size<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing first larger than the collection...");

    let runner = r.create(&Item::seed(10))?;
    let conn = runner.paginate(Args::default().with_first(100)).await?;

    assert_eq!(ids(&conn), (1..=10).collect::<Vec<_>>());
    assert!(!conn.page_info.has_next_page);
    assert!(!conn.page_info.has_previous_page);

    let conn = runner.paginate(Args::default().with_last(100)).await?;
    assert_eq!(conn.edges.len(), 10);
    assert!(!conn.page_info.has_previous_page);
    Ok(())
}

pub async fn test_zero_counts<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing zero first/last...");

    let runner = r.create(&Item::seed(10))?;
    let conn = runner.paginate(Args::default().with_first(0)).await?;
    assert!(conn.edges.is_empty());
    assert!(conn.page_info.has_next_page);
    assert!(!conn.page_info.has_previous_page);
    assert_eq!(conn.page_info.start_cursor, None);
    assert_eq!(conn.page_info.end_cursor, None);
    assert_eq!(conn.total_count, Some(10));

    let conn = runner.paginate(Args::default().with_last(0)).await?;
    assert!(conn.edges.is_empty());
    assert!(conn.page_info.has_previous_page);
    assert!(!conn.page_info.has_next_page);

    let empty = r.create(&[])?;
    let conn = empty.paginate(Args::default().with_first(0)).await?;
    assert!(conn.edges.is_empty());
    assert!(!conn.page_info.has_next_page);
    Ok(())
}

pub async fn test_empty_collection<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing empty collection...");

    let runner = r.create(&[])?;
    for args in [
        Args::default(),
        Args::default().with_first(5),
        Args::default().with_last(5),
        Args::default().with_after(cursor_for(1)).with_first(5),
    ] {
        let conn = runner.paginate(args).await?;
        assert!(conn.edges.is_empty());
        assert!(!conn.page_info.has_next_page);
        assert!(!conn.page_info.has_previous_page);
        assert_eq!(conn.page_info.start_cursor, None);
        assert_eq!(conn.page_info.end_cursor, None);
        assert_eq!(conn.total_count, Some(0));
    }
    Ok(())
}

pub async fn test_forward_walk<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing forward walk...");

    let runner = r.create(&Item::seed(10))?;
    let (seen, pages) = walk_forward(&runner, Args::default, 3).await?;

    assert_eq!(seen, (1..=10).collect::<Vec<_>>());
    assert_eq!(pages, 4);
    Ok(())
}

pub async fn test_backward_walk<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing backward walk...");

    let runner = r.create(&Item::seed(10))?;
    let mut seen = Vec::new();
    let mut before: Option<String> = None;
    loop {
        let mut args = Args::default().with_last(4);
        if let Some(cursor) = before.take() {
            args = args.with_before(cursor);
        }
        let conn = runner.paginate(args).await?;
        let mut page = ids(&conn);
        page.extend(seen);
        seen = page;
        if !conn.page_info.has_previous_page {
            break;
        }
        before = conn.page_info.start_cursor;
        anyhow::ensure!(seen.len() <= 10, "backward walk repeats items");
    }

    assert_eq!(seen, (1..=10).collect::<Vec<_>>());
    Ok(())
}

pub async fn test_cursor_round_trip<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing cursor round trip...");

    let runner = r.create(&Item::seed(10))?;
    let page = runner
        .paginate(Args::default().with_after(cursor_for(2)).with_first(3))
        .await?;
    assert_eq!(ids(&page), vec![3, 4, 5]);

    let start = page.page_info.start_cursor.clone().expect("page has edges");
    let end = page.page_info.end_cursor.clone().expect("page has edges");
    let head = runner.paginate(Args::default().with_before(start)).await?;
    let tail = runner.paginate(Args::default().with_after(end)).await?;

    let mut all = ids(&head);
    all.extend(ids(&page));
    all.extend(ids(&tail));
    assert_eq!(all, (1..=10).collect::<Vec<_>>());
    Ok(())
}

pub async fn test_total_count_ignores_window<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing total count...");

    let runner = r.create(&Item::seed(10))?;
    let bounded = || {
        Args::default()
            .with_after(cursor_for(2))
            .with_before(cursor_for(9))
    };

    let all = runner.paginate(bounded()).await?;
    assert_eq!(ids(&all), vec![3, 4, 5, 6, 7, 8]);
    assert_eq!(all.total_count, Some(6));

    let head = runner.paginate(bounded().with_first(2)).await?;
    assert_eq!(ids(&head), vec![3, 4]);
    assert_eq!(head.total_count, Some(6));
    assert!(head.page_info.has_next_page);

    let tail = runner.paginate(bounded().with_last(1)).await?;
    assert_eq!(ids(&tail), vec![8]);
    assert_eq!(tail.total_count, Some(6));
    assert!(tail.page_info.has_previous_page);

    let window = runner.paginate(bounded().with_first(4).with_last(2)).await?;
    assert_eq!(ids(&window), vec![5, 6]);
    assert_eq!(window.total_count, Some(6));
    Ok(())
}

pub async fn test_cursor_outside_range<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing cursors outside the range...");

    let runner = r.create(&Item::seed(10))?;
    let past_end = runner
        .paginate(Args::default().with_after(cursor_for(100)))
        .await?;
    assert!(past_end.edges.is_empty());
    assert_eq!(past_end.total_count, Some(0));

    let before_start = runner
        .paginate(Args::default().with_after(cursor_for(0)).with_first(2))
        .await?;
    assert_eq!(ids(&before_start), vec![1, 2]);
    assert_eq!(before_start.total_count, Some(10));
    assert!(!before_start.page_info.has_previous_page);

    let nothing_before = runner
        .paginate(Args::default().with_before(cursor_for(0)))
        .await?;
    assert!(nothing_before.edges.is_empty());
    Ok(())
}

pub async fn test_descending<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing descending order...");

    let runner = r.create(&Item::seed(10))?;
    let desc = || Args::default().with_order_direction(OrderDirection::Desc);

    let conn = runner.paginate(desc().with_first(3)).await?;
    assert_eq!(ids(&conn), vec![10, 9, 8]);
    assert!(conn.page_info.has_next_page);

    let conn = runner
        .paginate(desc().with_after(cursor_for(8)).with_first(3))
        .await?;
    assert_eq!(ids(&conn), vec![7, 6, 5]);

    let conn = runner.paginate(desc().with_last(2)).await?;
    assert_eq!(ids(&conn), vec![2, 1]);
    assert!(conn.page_info.has_previous_page);
    Ok(())
}

pub async fn test_invalid_input<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing invalid input...");

    let runner = r.create(&Item::seed(3))?;

    let err = runner.paginate(Args::default().with_first(-1)).await;
    assert!(matches!(err, Err(ConnectionError::InvalidArgument(_))));

    let err = runner.paginate(Args::default().with_last(-2)).await;
    assert!(matches!(err, Err(ConnectionError::InvalidArgument(_))));

    let err = runner
        .paginate(Args::default().with_first(1).with_last(1))
        .await;
    assert!(matches!(err, Err(ConnectionError::InvalidArgument(_))));

    let err = runner
        .paginate(Args::default().with_after("%%% not base64 %%%"))
        .await;
    assert!(matches!(err, Err(ConnectionError::InvalidCursor(_))));

    let two_values = relay_conn::encode_cursor(&[json!(1), json!(2)])?;
    let err = runner
        .paginate(Args::default().with_before(two_values))
        .await;
    assert!(matches!(err, Err(ConnectionError::InvalidCursor(_))));
    Ok(())
}

pub async fn test_skip_total_count<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing skipped total count...");

    let runner = r.create(&Item::seed(10))?;
    let opts = || Options::default().with_skip_total_count(true);

    let conn = runner
        .paginate_with(Args::default().with_first(4), opts())
        .await?;
    assert_eq!(ids(&conn), vec![1, 2, 3, 4]);
    assert_eq!(conn.total_count, None);
    assert!(conn.page_info.has_next_page);

    let conn = runner
        .paginate_with(Args::default().with_last(4), opts())
        .await?;
    assert_eq!(ids(&conn), vec![7, 8, 9, 10]);
    assert!(conn.page_info.has_previous_page);
    Ok(())
}

pub async fn test_modify_edge<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing edge post-processing...");

    let runner = r.create(&Item::seed(4))?;
    let opts = Options::default().with_modify_edge_fn(|edge: Edge<Item>| {
        let label = edge.node.name.to_uppercase();
        edge.with_metadata("label", json!(label))
    });
    let conn = runner
        .paginate_with(Args::default().with_first(2), opts)
        .await?;

    let labels: Vec<_> = conn.edges.iter().map(|e| e.metadata["label"].clone()).collect();
    assert_eq!(labels, vec![json!("ITEM-1"), json!("ITEM-2")]);
    assert_eq!(conn.edges[0].cursor, cursor_for(1));
    Ok(())
}

pub async fn test_walk_non_unique_column<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    if !R::ORDERS_BY_ANY_COLUMN {
        return Ok(());
    }
    println!("  Testing walk over a non-unique column...");

    // Scores repeat every five ids; pages of three split each pair.
    let runner = r.create(&Item::seed(10))?;
    let by_score = || Args::default().with_order_by("score");
    let (seen, _) = walk_forward(&runner, by_score, 3).await?;
    assert_eq!(seen, vec![5, 10, 3, 8, 1, 6, 4, 9, 2, 7]);

    let first = runner.paginate(by_score().with_first(1)).await?;
    assert_eq!(
        first.page_info.end_cursor,
        Some(relay_conn::encode_cursor(&[json!(0), json!(5)])?)
    );
    Ok(())
}

pub async fn test_nullable_column<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    if !R::ORDERS_BY_ANY_COLUMN {
        return Ok(());
    }
    println!("  Testing nullable order column...");

    // Items 3, 6 and 9 have no rank, and missing values sort first.
    let runner = r.create(&Item::seed(10))?;
    let by_rank = || Args::default().with_order_by(vec!["rank", "id"]);
    let (seen, _) = walk_forward(&runner, by_rank, 4).await?;
    assert_eq!(seen, vec![3, 6, 9, 10, 8, 7, 5, 4, 2, 1]);

    let null_nine = relay_conn::encode_cursor(&[Value::Null, json!(9)])?;
    let conn = runner
        .paginate(by_rank().with_after(null_nine.clone()).with_first(2))
        .await?;
    assert_eq!(ids(&conn), vec![10, 8]);
    assert_eq!(conn.total_count, Some(7));

    let conn = runner
        .paginate(by_rank().with_before(null_nine.clone()))
        .await?;
    assert_eq!(ids(&conn), vec![3, 6]);

    let conn = runner
        .paginate(
            by_rank()
                .with_order_direction(OrderDirection::Desc)
                .with_after(null_nine),
        )
        .await?;
    assert_eq!(ids(&conn), vec![6, 3]);
    Ok(())
}

pub async fn run_all_tests<R: TestSuiteRunner>(runner: R) -> anyhow::Result<()> {
    println!("Running all test cases...");

    test_first_page(&runner).await?;
    test_after_cursor(&runner).await?;
    test_last_page(&runner).await?;
    test_first_exceeds_size(&runner).await?;
    test_zero_counts(&runner).await?;
    test_empty_collection(&runner).await?;
    test_forward_walk(&runner).await?;
    test_backward_walk(&runner).await?;
    test_cursor_round_trip(&runner).await?;
    test_total_count_ignores_window(&runner).await?;
    test_cursor_outside_range(&runner).await?;
    test_descending(&runner).await?;
    test_invalid_input(&runner).await?;
    test_skip_total_count(&runner).await?;
    test_modify_edge(&runner).await?;
    test_walk_non_unique_column(&runner).await?;
    test_nullable_column(&runner).await?;

    println!("All tests passed!");
    Ok(())
}
