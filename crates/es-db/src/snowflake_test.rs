use super::*;

fn profile() -> SnowflakeProfile {
    SnowflakeProfile {
        account: "xy12345".into(),
        token: "pat-token".into(),
        token_type: "PROGRAMMATIC_ACCESS_TOKEN".into(),
        user: Some("tester".into()),
        warehouse: Some("COMPUTE_WH".into()),
        role: None,
        database: Some("ANALYTICS".into()),
        schema: Some("PUBLIC".into()),
        host: None,
    }
}

const DONE_BODY: &str = r#"{
    "resultSetMetaData": {
        "numRows": 2,
        "format": "jsonv2",
        "partitionInfo": [{"rowCount": 2, "uncompressedSize": 64}],
        "rowType": [
            {"name": "ID", "type": "fixed", "scale": 0, "nullable": false},
            {"name": "AMOUNT", "type": "fixed", "scale": 2, "nullable": true},
            {"name": "ACTIVE", "type": "boolean", "nullable": true},
            {"name": "CREATED", "type": "date", "nullable": true},
            {"name": "UPDATED_AT", "type": "timestamp_ntz", "nullable": true},
            {"name": "NOTE", "type": "text", "nullable": true}
        ]
    },
    "data": [
        ["1", "-10.50", "true", "19723", "1704067200.123000000", "late"],
        ["2", null, "false", null, null, null]
    ],
    "code": "090001",
    "statementHandle": "01b2-0000",
    "message": "Statement executed successfully."
}"#;

#[test]
fn test_submit_body_carries_context() {
    let p = profile();
    let body = submit_body(&p, "SELECT 1", Some(Duration::from_secs(600)));
    let json = serde_json::to_value(&body).unwrap();

    assert_eq!(json["statement"], "SELECT 1");
    assert_eq!(json["timeout"], 600);
    assert_eq!(json["warehouse"], "COMPUTE_WH");
    assert_eq!(json["database"], "ANALYTICS");
    assert_eq!(json["schema"], "PUBLIC");
    assert!(json.get("role").is_none());
    assert_eq!(json["parameters"]["query_tag"], QUERY_TAG);
}

#[test]
fn test_submit_body_without_timeout() {
    let p = profile();
    let json = serde_json::to_value(submit_body(&p, "SELECT 1", None)).unwrap();
    assert!(json.get("timeout").is_none());
}

#[test]
fn test_interpret_status_codes() {
    assert!(matches!(
        interpret(StatusCode::ACCEPTED, r#"{"statementHandle":"h"}"#),
        Ok(PollState::Running)
    ));
    assert!(matches!(
        interpret(StatusCode::TOO_MANY_REQUESTS, ""),
        Ok(PollState::Running)
    ));
    assert!(matches!(
        interpret(StatusCode::OK, DONE_BODY),
        Ok(PollState::Done(_))
    ));

    let err = interpret(
        StatusCode::UNPROCESSABLE_ENTITY,
        r#"{"code":"002003","message":"SQL compilation error: Object 'ORDERS' does not exist"}"#,
    )
    .unwrap_err();
    match err {
        DbError::ExecutionError(msg) => assert!(msg.contains("does not exist")),
        other => panic!("unexpected error: {other}"),
    }

    assert!(matches!(
        interpret(StatusCode::UNAUTHORIZED, r#"{"message":"bad token"}"#),
        Err(DbError::ConnectionError(_))
    ));
    assert!(matches!(
        interpret(StatusCode::BAD_REQUEST, "not json"),
        Err(DbError::PollError(_))
    ));
}

#[test]
fn test_malformed_success_body_is_poll_error() {
    assert!(matches!(
        interpret(StatusCode::OK, "{not json"),
        Err(DbError::PollError(_))
    ));
}

#[test]
fn test_result_conversion() {
    let body = parse_body(DONE_BODY).unwrap();
    let meta = body.result_set_meta_data.unwrap();
    assert_eq!(meta.partition_info.len(), 1);

    let rows = to_row_set(&meta.row_type, body.data);
    assert_eq!(
        rows.columns,
        vec!["ID", "AMOUNT", "ACTIVE", "CREATED", "UPDATED_AT", "NOTE"]
    );
    assert_eq!(
        rows.rows[0],
        vec![
            CellValue::Int(1),
            CellValue::Text("-10.50".into()),
            CellValue::Bool(true),
            CellValue::Text("2024-01-01".into()),
            CellValue::Text("2024-01-01 00:00:00.123".into()),
            CellValue::Text("late".into()),
        ]
    );
    assert_eq!(rows.rows[1][1], CellValue::Null);
    assert_eq!(rows.rows[1][2], CellValue::Bool(false));
}

#[test]
fn test_count_result_parses() {
    let body = r#"{
        "resultSetMetaData": {"rowType": [{"name": "COUNT(*)", "type": "fixed", "scale": 0}],
                              "partitionInfo": [{"rowCount": 1}]},
        "data": [["17"]]
    }"#;
    let parsed = parse_body(body).unwrap();
    let rows = to_row_set(&parsed.result_set_meta_data.unwrap().row_type, parsed.data);
    assert_eq!(crate::session::parse_count(&rows).unwrap(), 17);
}

#[test]
fn test_epoch_to_text() {
    assert_eq!(epoch_to_text("0").as_deref(), Some("1970-01-01 00:00:00"));
    assert_eq!(
        epoch_to_text("1704067200.5 1440").as_deref(),
        Some("2024-01-01 00:00:00.500")
    );
    assert_eq!(epoch_to_text("garbage"), None);
    assert_eq!(epoch_to_text("-1.5"), None);
}

#[test]
fn test_base_url_honours_host_override() {
    let mut p = profile();
    assert_eq!(p.base_url(), "https://xy12345.snowflakecomputing.com");
    p.host = Some("http://localhost:8080".into());
    assert_eq!(p.base_url(), "http://localhost:8080");
}

#[test]
fn test_date_from_epoch_days_bounds() {
    assert_eq!(
        date_from_epoch_days(19_723).map(|d| d.to_string()).as_deref(),
        Some("2024-01-01")
    );
    assert_eq!(date_from_epoch_days(i64::from(i32::MAX) + 1), None);
    assert_eq!(date_from_epoch_days(i64::from(i32::MAX)), None);
    assert_eq!(date_from_epoch_days(i64::MIN), None);

    let column = ColumnType {
        name: "CREATED".into(),
        type_name: "date".into(),
        scale: None,
    };
    assert_eq!(
        convert_value(Some("99999999999".into()), &column),
        CellValue::Text("99999999999".into())
    );
}
