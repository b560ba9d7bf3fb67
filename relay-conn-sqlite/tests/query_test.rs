use anyhow::Result;
use r2d2::Pool;
use r2d2_sqlite::rusqlite::types::Value as SqlValue;
use r2d2_sqlite::SqliteConnectionManager;
use relay_conn::{connection_builder, encode_cursor, Args, OrderDirection, Options};
use relay_conn_sqlite::{SqliteConnector, SqliteQuery};
use relay_conn_test_suite::{cursor_for, Item};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Single-connection pool, so every checkout sees the same in-memory database.
fn setup_test_db(schema: &str) -> Result<Pool<SqliteConnectionManager>> {
    let pool = Pool::builder()
        .max_size(1)
        .build(SqliteConnectionManager::memory())?;
    pool.get()?.execute_batch(schema)?;
    Ok(pool)
}

fn seed_items(table: &str, columns: &str) -> String {
    let rows = Item::seed(10)
        .into_iter()
        .map(|item| format!("({}, '{}', {})", item.id, item.name, item.score))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({columns}) VALUES {rows};")
}

fn ids(edges: &[relay_conn::Edge<Item>]) -> Vec<i64> {
    edges.iter().map(|e| e.node.id).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AuthorStats {
    id: i64,
    name: String,
    post_count: i64,
}

#[tokio::test]
async fn test_aggregate_ordering_uses_having() -> Result<()> {
    let pool = setup_test_db(
        r#"
CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE posts (id INTEGER PRIMARY KEY, author_id INTEGER NOT NULL);
INSERT INTO authors (id, name) VALUES (1, 'ann'), (2, 'bob'), (3, 'cid'), (4, 'dee'), (5, 'eve');
INSERT INTO posts (author_id) VALUES (1), (1), (3), (3), (3), (4), (4), (5);
"#,
    )?;
    let builder = connection_builder(SqliteConnector::<AuthorStats>::new(pool));
    let query = SqliteQuery::table("authors LEFT JOIN posts ON posts.author_id = authors.id")
        .select([
            "authors.id AS id",
            "authors.name AS name",
            "COUNT(posts.id) AS post_count",
        ])
        .group_by(["authors.id"]);
    let opts = || {
        Options::default()
            .with_format_column_fn(|column| match column {
                "post_count" => "COUNT(posts.id)".to_string(),
                other => format!("authors.{other}"),
            })
            .with_is_aggregate_fn(|column| column == "post_count")
    };
    let args = || {
        Args::default()
            .with_order_by(vec!["post_count", "id"])
            .with_order_direction(OrderDirection::Desc)
            .with_first(2)
    };

    let conn = builder.paginate(query.clone(), args(), &opts()).await?;
    let page: Vec<i64> = conn.edges.iter().map(|e| e.node.id).collect();
    assert_eq!(page, vec![3, 4]);
    assert_eq!(conn.total_count, Some(5));
    assert!(conn.page_info.has_next_page);
    assert_eq!(
        conn.page_info.end_cursor,
        Some(encode_cursor(&[json!(2), json!(4)])?)
    );

    let after = conn.page_info.end_cursor.clone().unwrap_or_default();
    let conn = builder
        .paginate(query.clone(), args().with_after(after), &opts())
        .await?;
    let page: Vec<i64> = conn.edges.iter().map(|e| e.node.id).collect();
    assert_eq!(page, vec![1, 5]);
    assert!(conn.page_info.has_previous_page);
    assert!(conn.page_info.has_next_page);
    assert_eq!(conn.total_count, Some(3));

    let after = conn.page_info.end_cursor.clone().unwrap_or_default();
    let conn = builder.paginate(query, args().with_after(after), &opts()).await?;
    assert_eq!(conn.edges.len(), 1);
    assert_eq!(conn.edges[0].node.post_count, 0);
    assert!(!conn.page_info.has_next_page);
    Ok(())
}

#[tokio::test]
async fn test_ties_break_on_second_column() -> Result<()> {
    let pool = setup_test_db(&format!(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score INTEGER NOT NULL);\n{}",
        seed_items("items", "id, name, score")
    ))?;
    let builder = connection_builder(SqliteConnector::<Item>::new(pool));
    let query = SqliteQuery::table("items").select(["id", "name", "score"]);
    let args = || Args::default().with_order_by(vec!["score", "id"]);

    let conn = builder
        .paginate(query.clone(), args().with_first(4), &Options::default())
        .await?;
    assert_eq!(ids(&conn.edges), vec![5, 10, 3, 8]);
    assert_eq!(
        conn.edges[3].cursor,
        encode_cursor(&[json!(1), json!(8)])?
    );

    let conn = builder
        .paginate(
            query,
            args().with_after(conn.edges[3].cursor.clone()).with_first(3),
            &Options::default(),
        )
        .await?;
    assert_eq!(ids(&conn.edges), vec![1, 6, 4]);
    assert!(conn.page_info.has_previous_page);
    assert!(conn.page_info.has_next_page);
    Ok(())
}

#[tokio::test]
async fn test_cursor_survives_column_rename() -> Result<()> {
    let pool = setup_test_db(&format!(
        "CREATE TABLE items_v2 (id INTEGER PRIMARY KEY, label TEXT NOT NULL, points INTEGER NOT NULL);\n{}",
        seed_items("items_v2", "id, label, points")
    ))?;
    let builder = connection_builder(SqliteConnector::<Item>::new(pool));
    let query = SqliteQuery::table("items_v2").select(["id", "label AS name", "points AS score"]);
    let opts = Options::default().with_format_column_fn(|column| match column {
        "score" => "points".to_string(),
        other => other.to_string(),
    });

    // Issued before the rename, against (score, id).
    let cursor = encode_cursor(&[json!(1), json!(8)])?;
    let conn = builder
        .paginate(
            query,
            Args::default()
                .with_order_by(vec!["score", "id"])
                .with_after(cursor)
                .with_first(3),
            &opts,
        )
        .await?;
    assert_eq!(ids(&conn.edges), vec![1, 6, 4]);
    assert_eq!(conn.edges[0].node.name, "item-1");
    assert_eq!(conn.edges[0].node.score, 2);
    Ok(())
}

#[tokio::test]
async fn test_filters_are_preserved() -> Result<()> {
    let pool = setup_test_db(&format!(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score INTEGER NOT NULL);\n{}",
        seed_items("items", "id, name, score")
    ))?;
    let builder = connection_builder(SqliteConnector::<Item>::new(pool));
    let query = SqliteQuery::table("items")
        .select(["id", "name", "score"])
        .filter("score > ?", vec![SqlValue::Integer(1)]);

    let conn = builder
        .paginate(query.clone(), Args::default().with_first(2), &Options::default())
        .await?;
    assert_eq!(ids(&conn.edges), vec![1, 2]);
    assert_eq!(conn.total_count, Some(6));

    let conn = builder
        .paginate(
            query,
            Args::default().with_after(cursor_for(2)).with_last(2),
            &Options::default(),
        )
        .await?;
    assert_eq!(ids(&conn.edges), vec![7, 9]);
    assert_eq!(conn.total_count, Some(4));
    assert!(conn.page_info.has_previous_page);
    assert!(!conn.page_info.has_next_page);
    Ok(())
}

#[tokio::test]
async fn test_order_by_must_name_a_column() -> Result<()> {
    let pool = setup_test_db(&format!(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score INTEGER NOT NULL);\n\
         CREATE TABLE secrets (token TEXT NOT NULL);\n\
         INSERT INTO secrets (token) VALUES ('hunter2');\n{}",
        seed_items("items", "id, name, score")
    ))?;
    let builder = connection_builder(SqliteConnector::<Item>::new(pool.clone()));
    let query = SqliteQuery::table("items").select(["id", "name", "score"]);

    for order_by in [
        "(SELECT token FROM secrets)",
        "id; DROP TABLE secrets",
        "score DESC, id",
    ] {
        let err = builder
            .paginate(
                query.clone(),
                Args::default().with_order_by(order_by).with_first(2),
                &Options::default(),
            )
            .await;
        assert!(
            matches!(err, Err(relay_conn::ConnectionError::InvalidArgument(_))),
            "{order_by}"
        );
    }

    let cursor = encode_cursor(&[json!(1), json!(3)])?;
    let err = builder
        .paginate(
            query.clone(),
            Args::default()
                .with_order_by(vec!["score", "id) OR (1"])
                .with_after(cursor),
            &Options::default(),
        )
        .await;
    assert!(matches!(
        err,
        Err(relay_conn::ConnectionError::InvalidArgument(_))
    ));

    let tokens: i64 = pool
        .get()?
        .query_row("SELECT COUNT(*) FROM secrets", [], |row| row.get(0))?;
    assert_eq!(tokens, 1);

    let conn = builder
        .paginate(
            query,
            Args::default().with_order_by("items.score").with_first(2),
            &Options::default(),
        )
        .await?;
    assert_eq!(ids(&conn.edges), vec![5, 10]);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Blob {
    id: i64,
    digest: Vec<u8>,
}

#[tokio::test]
async fn test_blob_column_cursor() -> Result<()> {
    let pool = setup_test_db(
        r#"
CREATE TABLE blobs (id INTEGER PRIMARY KEY, digest BLOB NOT NULL);
INSERT INTO blobs (id, digest) VALUES (1, x'03'), (2, x'0100'), (3, x'ff'), (4, x'02');
"#,
    )?;
    let builder = connection_builder(SqliteConnector::<Blob>::new(pool));
    let query = SqliteQuery::table("blobs").select(["id", "digest"]);
    let by_digest = || Args::default().with_order_by("digest");

    let conn = builder
        .paginate(query.clone(), by_digest().with_first(2), &Options::default())
        .await?;
    let page: Vec<i64> = conn.edges.iter().map(|e| e.node.id).collect();
    assert_eq!(page, vec![2, 4]);
    assert_eq!(conn.edges[0].node.digest, vec![1, 0]);
    assert_eq!(
        conn.page_info.end_cursor,
        Some(encode_cursor(&[json!([2]), json!(4)])?)
    );

    let after = conn.page_info.end_cursor.clone().unwrap_or_default();
    let conn = builder
        .paginate(query, by_digest().with_after(after), &Options::default())
        .await?;
    let page: Vec<i64> = conn.edges.iter().map(|e| e.node.id).collect();
    assert_eq!(page, vec![1, 3]);
    assert_eq!(conn.total_count, Some(2));
    Ok(())
}
