//! Walks a feed of posts, newest first, three at a time, and prints each
//! page as the JSON a GraphQL resolver would return.

use anyhow::Result;
use r2d2::Pool;
use r2d2_sqlite::rusqlite::params;
use r2d2_sqlite::SqliteConnectionManager;
use relay_conn::{connection_builder, Args, OrderDirection, Options};
use relay_conn_sqlite::{SqliteConnector, SqliteQuery};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Post {
    id: i64,
    author: String,
    title: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let pool = Pool::builder()
        .max_size(1)
        .build(SqliteConnectionManager::memory())?;
    {
        let conn = pool.get()?;
        conn.execute_batch(
            r#"
CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE posts (
   id INTEGER PRIMARY KEY,
   author_id INTEGER NOT NULL REFERENCES authors(id),
   title TEXT NOT NULL
);
INSERT INTO authors (id, name) VALUES (1, 'alice'), (2, 'bob');
"#,
        )?;
        for id in 1..=8 {
            conn.execute(
                "INSERT INTO posts (id, author_id, title) VALUES (?1, ?2, ?3)",
                params![id, id % 2 + 1, format!("post #{id}")],
            )?;
        }
    }

    let builder = connection_builder(SqliteConnector::<Post>::new(pool));
    let feed = SqliteQuery::table("posts JOIN authors ON authors.id = posts.author_id").select([
        "posts.id AS id",
        "authors.name AS author",
        "posts.title AS title",
    ]);
    let opts = Options::default().with_format_column_fn(|column| format!("posts.{column}"));

    let mut after = None;
    loop {
        let mut args = Args::default()
            .with_first(3)
            .with_order_direction(OrderDirection::Desc);
        if let Some(cursor) = after.take() {
            args = args.with_after(cursor);
        }

        let page = builder.paginate(feed.clone(), args, &opts).await?;
        println!("{}", serde_json::to_string_pretty(&page)?);

        if !page.page_info.has_next_page {
            break;
        }
        after = page.page_info.end_cursor;
    }
    Ok(())
}
