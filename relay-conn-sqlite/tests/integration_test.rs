use anyhow::Result;
use r2d2::Pool;
use r2d2_sqlite::rusqlite::params;
use r2d2_sqlite::SqliteConnectionManager;
use relay_conn::{connection_builder, ConnectionBuilder};
use relay_conn_sqlite::{SqliteConnector, SqliteQuery};
use relay_conn_test_suite::{run_all_tests, Item, TestCaseRunner, TestSuiteRunner};
use tempfile::TempDir;

struct SqliteTestRunner;

struct SqliteCaseRunner {
    builder: ConnectionBuilder<SqliteConnector<Item>>,
    // Keeps the database file alive for the duration of the case.
    _dir: TempDir,
}

impl TestCaseRunner for SqliteCaseRunner {
    type Connector = SqliteConnector<Item>;

    fn builder(&self) -> &ConnectionBuilder<Self::Connector> {
        &self.builder
    }

    fn accessor(&self) -> SqliteQuery {
        SqliteQuery::table("items").select(["id", "name", "score", "rank"])
    }
}

impl TestSuiteRunner for SqliteTestRunner {
    type CaseRunner = SqliteCaseRunner;

    fn create(&self, items: &[Item]) -> Result<Self::CaseRunner> {
        let dir = TempDir::new()?;
        let pool = Pool::new(SqliteConnectionManager::file(dir.path().join("items.db")))?;

        let mut conn = pool.get()?;
        conn.execute_batch(
            r#"
CREATE TABLE items (
   id INTEGER PRIMARY KEY,
   name TEXT NOT NULL,
   score INTEGER NOT NULL,
   rank INTEGER
);
"#,
        )?;
        let tx = conn.transaction()?;
        for item in items {
            tx.execute(
                "INSERT INTO items (id, name, score, rank) VALUES (?1, ?2, ?3, ?4)",
                params![item.id, item.name, item.score, item.rank],
            )?;
        }
        tx.commit()?;

        Ok(SqliteCaseRunner {
            builder: connection_builder(SqliteConnector::new(pool)),
            _dir: dir,
        })
    }
}

#[tokio::test]
async fn test_all_sqlite() -> Result<()> {
    run_all_tests(SqliteTestRunner).await
}
