use super::*;
use async_trait::async_trait;

/// In-memory session that records every statement it sees
#[derive(Default)]
struct FakeSession {
    catalog: Option<String>,
    schema: Option<String>,
    fail_catalog: bool,
    executed: Vec<String>,
    count: Option<CellValue>,
    sample: Vec<Vec<CellValue>>,
}

#[async_trait]
impl Session for FakeSession {
    async fn apply(&mut self, statement: &SetupStatement) -> DbResult<()> {
        self.executed.push(statement.sql());
        match statement {
            SetupStatement::UseCatalog(_) if self.fail_catalog => Err(DbError::ExecutionError(
                "PERMISSION_DENIED: USE CATALOG".to_string(),
            )),
            SetupStatement::UseCatalog(c) => {
                self.catalog = Some(c.clone());
                Ok(())
            }
            SetupStatement::UseSchema(s) | SetupStatement::SearchPath(s) => {
                self.schema = Some(s.clone());
                Ok(())
            }
        }
    }

    async fn query(&mut self, sql: &str, _limit: Option<usize>) -> DbResult<RowSet> {
        self.executed.push(sql.to_string());
        if sql.starts_with("SELECT COUNT(*)") {
            let rows = self.count.clone().map(|v| vec![v]).into_iter().collect();
            Ok(RowSet::new(vec!["count".into()], rows))
        } else {
            Ok(RowSet::new(vec!["id".into()], self.sample.clone()))
        }
    }
}

#[tokio::test]
async fn test_failed_catalog_setup_still_runs_query() {
    let mut session = FakeSession {
        fail_catalog: true,
        count: Some(CellValue::Int(0)),
        ..Default::default()
    };
    let setup = vec![
        SetupStatement::UseCatalog("main".into()),
        SetupStatement::UseSchema("analytics".into()),
    ];

    let outcome = dispatch_on(&mut session, &setup, "SELECT 1 WHERE 1 = 0;".into())
        .await
        .unwrap();

    assert_eq!(outcome.row_count, 0);
    assert_eq!(session.catalog, None);
    assert_eq!(session.schema.as_deref(), Some("analytics"));
    assert_eq!(session.executed.len(), 3);
    assert!(session.executed[2].starts_with("SELECT COUNT(*) FROM (\nSELECT 1 WHERE 1 = 0\n)"));
}

#[tokio::test]
async fn test_apply_setup_reports_failures() {
    let mut session = FakeSession {
        fail_catalog: true,
        ..Default::default()
    };
    let failed = apply_setup(
        &mut session,
        &[
            SetupStatement::UseCatalog("main".into()),
            SetupStatement::UseSchema("s".into()),
        ],
    )
    .await;
    assert_eq!(failed, vec![SetupStatement::UseCatalog("main".into())]);
}

#[tokio::test]
async fn test_count_rows_keeps_original_sql() {
    let mut session = FakeSession {
        count: Some(CellValue::Text("5".into())),
        ..Default::default()
    };
    let sql = "SELECT * FROM orders WHERE amount < 0;\n".to_string();

    let outcome = count_rows(&mut session, sql.clone()).await.unwrap();
    assert_eq!(outcome.row_count, 5);
    assert_eq!(outcome.sql, sql);
    assert!(outcome.elapsed_secs >= 0.0);
}

#[tokio::test]
async fn test_count_rows_without_row_fails() {
    let mut session = FakeSession::default();
    let err = count_rows(&mut session, "SELECT 1".into()).await.unwrap_err();
    assert!(matches!(err, DbError::NoRowReturned));
}

#[tokio::test]
async fn test_sample_rows_truncates_to_limit() {
    let mut session = FakeSession {
        sample: (0..5).map(|i| vec![CellValue::Int(i)]).collect(),
        ..Default::default()
    };

    let sample = sample_rows(&mut session, "SELECT id FROM t;", 3).await.unwrap();
    assert_eq!(sample.columns, vec!["id".to_string()]);
    assert_eq!(sample.rows.len(), 3);
    assert_eq!(
        session.executed.last().unwrap(),
        "SELECT * FROM (\nSELECT id FROM t\n) AS t LIMIT 3"
    );
}

#[test]
fn test_parse_count_variants() {
    let one = |v: CellValue| RowSet::new(vec!["c".into()], vec![vec![v]]);

    assert_eq!(parse_count(&one(CellValue::Int(12))).unwrap(), 12);
    assert_eq!(parse_count(&one(CellValue::Float(3.0))).unwrap(), 3);
    assert_eq!(parse_count(&one(CellValue::Text(" 42 ".into()))).unwrap(), 42);

    assert!(matches!(
        parse_count(&one(CellValue::Int(-1))),
        Err(DbError::InvalidCount(_))
    ));
    assert!(matches!(
        parse_count(&one(CellValue::Text("many".into()))),
        Err(DbError::InvalidCount(_))
    ));
    assert!(matches!(
        parse_count(&one(CellValue::Null)),
        Err(DbError::InvalidCount(_))
    ));
    assert!(matches!(
        parse_count(&RowSet::new(vec!["c".into()], vec![vec![]])),
        Err(DbError::NoRowReturned)
    ));
}

#[tokio::test]
async fn test_read_sql_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_sql(&dir.path().join("gone.es.sql")).await.unwrap_err();
    assert!(matches!(err, DbError::SqlFileRead { .. }));
}

#[test]
fn test_round_secs() {
    assert_eq!(round_secs(Duration::from_micros(1_234_567)), 1.235);
    assert_eq!(round_secs(Duration::ZERO), 0.0);
}
