//! Google Sheets adapter contract tests.
//!
//! These tests pin the exact HTTP traffic of the Sheets adapter against a
//! wiremock server: range encoding, bearer auth, header-based column
//! lookup and the cells written for a completion.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};
use serde_json::json;
use shiftbot::config::SheetsConfig;
use shiftbot::dates::SheetDate;
use shiftbot::model::{Completion, TaskStatus};
use shiftbot::store::auth::TokenSource;
use shiftbot::store::{RemoteStore, SheetsStore};
use shiftbot::BotError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SPREADSHEET: &str = "sheet-1";
const TOKEN: &str = "test-token";

fn store_for(server: &MockServer) -> SheetsStore {
    SheetsStore::new(&SheetsConfig {
        spreadsheet_id: SPREADSHEET.to_owned(),
        access_token: TOKEN.to_owned(),
        api_base_url: server.uri(),
        ..SheetsConfig::default()
    })
    .unwrap()
}

fn values_path(range: &str) -> String {
    format!(
        "/v4/spreadsheets/{SPREADSHEET}/values/{}",
        urlencoding::encode(range)
    )
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// Reads
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_tasks_reads_columns_by_header() {
    let server = MockServer::start().await;

    // Columns deliberately out of the default order.
    Mock::given(method("GET"))
        .and(path(values_path("'График чистки'")))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "'График чистки'!A1:Z1000",
            "majorDimension": "ROWS",
            "values": [
                ["Статус", "Название", "Периодичность", "Последняя чистка", "Следующая чистка", "Выполнил"],
                ["⏳", "Гриль", "7 дней", "01.01.2024", "-", "-"],
                ["", "", "", "", "", ""],
                ["✅", "Кофемашина", "1 день", "08.01.2024", "09.01.2024", "Анна Петрова"],
                ["⏳", "Холодильник", "ежемесячно"]
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tasks = store_for(&server).fetch_tasks().await.unwrap();
    assert_eq!(tasks.len(), 3);

    let grill = &tasks[0];
    assert_eq!(grill.id, 2);
    assert_eq!(grill.name, "Гриль");
    assert_eq!(grill.period, "7 дней");
    assert_eq!(grill.last_completed_date, SheetDate::Date(ymd(2024, 1, 1)));
    assert_eq!(grill.next_due_date, SheetDate::Empty);
    assert_eq!(grill.completed_by, None);
    assert_eq!(grill.status, TaskStatus::Pending);

    // the blank row 3 is skipped but still counts for row numbering
    let coffee = &tasks[1];
    assert_eq!(coffee.id, 4);
    assert_eq!(coffee.status, TaskStatus::Done);
    assert_eq!(coffee.next_due_date, SheetDate::Date(ymd(2024, 1, 9)));
    assert_eq!(coffee.completed_by.as_deref(), Some("Анна Петрова"));

    // short rows leave trailing columns empty
    let fridge = &tasks[2];
    assert_eq!(fridge.id, 5);
    assert!(fridge.last_completed_date.is_empty());
}

#[tokio::test]
async fn fetch_shifts_filters_by_date_and_dedupes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(values_path("'Смены'")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["Дата", "ФИО", "Telegram", "Время начала", "Время окончания"],
                ["10.01.2024", "Анна Петрова", "@Anna", "08:00", "16:00"],
                ["10.01.2024", "Анна Петрова", "anna", "16:00", "20:00"],
                ["10.01.2024", "Иван Смирнов", "ivan", "12:00", ""],
                ["11.01.2024", "Иван Смирнов", "ivan", "08:00", "16:00"],
                ["10.01.2024", "Без ника", "", "08:00", "16:00"]
            ]
        })))
        .mount(&server)
        .await;

    let shifts = store_for(&server).fetch_shifts(ymd(2024, 1, 10)).await.unwrap();
    assert_eq!(shifts.len(), 2);
    assert_eq!(shifts[0].user_handle, "anna");
    assert_eq!(shifts[0].start_time, NaiveTime::from_hms_opt(8, 0, 0));
    assert_eq!(shifts[0].end_time, NaiveTime::from_hms_opt(16, 0, 0));
    assert_eq!(shifts[1].employee_name, "Иван Смирнов");
    assert_eq!(shifts[1].end_time, None);
}

#[tokio::test]
async fn fetch_employees_normalizes_handles() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(values_path("'Сотрудники'")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["ФИО", "Telegram", "Должность"],
                ["Анна Петрова", "@Anna", "Бариста"],
                ["Иван Смирнов", "ivan"]
            ]
        })))
        .mount(&server)
        .await;

    let employees = store_for(&server).fetch_employees().await.unwrap();
    assert_eq!(employees.len(), 2);
    assert_eq!(employees[0].handle, "anna");
    assert_eq!(employees[0].position.as_deref(), Some("Бариста"));
    assert_eq!(employees[1].position, None);
}

#[tokio::test]
async fn empty_sheet_yields_no_rows() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(values_path("'Сотрудники'")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "'Сотрудники'!A1:Z1000",
            "majorDimension": "ROWS"
        })))
        .mount(&server)
        .await;

    let employees = store_for(&server).fetch_employees().await.unwrap();
    assert!(employees.is_empty());
}

#[tokio::test]
async fn http_error_maps_to_store_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch_tasks().await.unwrap_err();
    match err {
        BotError::StoreStatus { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("backend error"), "message was: {message}");
        }
        other => panic!("expected store status error, got {other:?}"),
    }
}

#[tokio::test]
async fn employee_sheet_without_handle_column_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(values_path("'Сотрудники'")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["ФИО", "Ник", "Должность"],
                ["Анна Петрова", "@Anna", "Бариста"]
            ]
        })))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch_employees().await.unwrap_err();
    assert!(matches!(err, BotError::Store(_)), "{err:?}");
}

#[tokio::test]
async fn employee_sheet_without_name_column_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(values_path("'Сотрудники'")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["Сотрудник", "Telegram"],
                ["Анна Петрова", "@Anna"]
            ]
        })))
        .mount(&server)
        .await;

    assert!(store_for(&server).fetch_employees().await.is_err());
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "values": [] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let store = SheetsStore::new(&SheetsConfig {
        spreadsheet_id: SPREADSHEET.to_owned(),
        access_token: TOKEN.to_owned(),
        api_base_url: server.uri(),
        request_timeout_secs: 1,
        ..SheetsConfig::default()
    })
    .unwrap();

    let started = Instant::now();
    assert!(store.fetch_tasks().await.is_err());
    assert!(started.elapsed() < Duration::from_secs(4));
}

/// Hands out `t1`, `t2`, ... so each request shows which token it carried.
#[derive(Default)]
struct RotatingToken {
    issued: AtomicUsize,
}

#[async_trait]
impl TokenSource for RotatingToken {
    async fn bearer(&self) -> shiftbot::Result<String> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("t{n}"))
    }
}

#[tokio::test]
async fn every_request_asks_the_token_source() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(values_path("'Сотрудники'")))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["ФИО", "Telegram"], ["Анна Петрова", "anna"]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(values_path("'Сотрудники'")))
        .and(header("authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["ФИО", "Telegram"], ["Иван Смирнов", "ivan"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(RotatingToken::default());
    let store = store_for(&server).with_token_source(tokens.clone());

    assert_eq!(store.fetch_employees().await.unwrap()[0].handle, "anna");
    assert_eq!(store.fetch_employees().await.unwrap()[0].handle, "ivan");
    assert_eq!(tokens.issued.load(Ordering::SeqCst), 2);
}

// ────────────────────────────────────────────────────────────────────────────
// Writes
// ────────────────────────────────────────────────────────────────────────────

fn completion(task_id: u32, period: &str) -> Completion {
    Completion {
        task_id,
        completed_by: "Анна Петрова".to_owned(),
        completed_at: FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 8, 10, 0, 0)
            .unwrap(),
        period: period.to_owned(),
    }
}

async fn mount_task_header(server: &MockServer, header_row: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(values_path("'График чистки'!1:1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [header_row]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn persist_completion_writes_four_cells_in_one_batch() {
    let server = MockServer::start().await;
    mount_task_header(
        &server,
        json!(["Название", "Периодичность", "Последняя чистка", "Следующая чистка", "Выполнил", "Статус"]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path(format!("/v4/spreadsheets/{SPREADSHEET}/values:batchUpdate")))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_partial_json(json!({
            "valueInputOption": "RAW",
            "data": [
                { "range": "'График чистки'!C3", "values": [["08.01.2024"]] },
                { "range": "'График чистки'!D3", "values": [["15.01.2024"]] },
                { "range": "'График чистки'!E3", "values": [["Анна Петрова"]] },
                { "range": "'График чистки'!F3", "values": [["✅"]] }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": SPREADSHEET,
            "totalUpdatedCells": 4
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ok = store_for(&server)
        .persist_completion(&completion(3, "7 дней"))
        .await
        .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn unparseable_period_writes_empty_marker_as_next_due() {
    let server = MockServer::start().await;
    mount_task_header(
        &server,
        json!(["Название", "Периодичность", "Последняя чистка", "Следующая чистка", "Выполнил", "Статус"]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path(format!("/v4/spreadsheets/{SPREADSHEET}/values:batchUpdate")))
        .and(body_partial_json(json!({
            "data": [
                { "range": "'График чистки'!C2" },
                { "range": "'График чистки'!D2", "values": [["-"]] }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let ok = store_for(&server)
        .persist_completion(&completion(2, "по необходимости"))
        .await
        .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn persist_completion_rejects_missing_columns_without_writing() {
    let server = MockServer::start().await;
    mount_task_header(&server, json!(["Название", "Периодичность"])).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let ok = store_for(&server)
        .persist_completion(&completion(3, "7 дней"))
        .await
        .unwrap();
    assert!(!ok);
}

#[tokio::test]
async fn persist_completion_rejects_header_row() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let ok = store_for(&server)
        .persist_completion(&completion(1, "7 дней"))
        .await
        .unwrap();
    assert!(!ok);
}

// ────────────────────────────────────────────────────────────────────────────
// Layout bootstrap
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_layout_creates_missing_sheet_and_headers() {
    let server = MockServer::start().await;

    // employees: complete header
    Mock::given(method("GET"))
        .and(path(values_path("'Сотрудники'!1:1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["ФИО", "Telegram", "Должность"]]
        })))
        .mount(&server)
        .await;

    // tasks: sheet exists but is empty
    Mock::given(method("GET"))
        .and(path(values_path("'График чистки'!1:1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(values_path("'График чистки'!A1")))
        .and(body_partial_json(json!({
            "values": [["Название", "Периодичность", "Последняя чистка", "Следующая чистка", "Выполнил", "Статус"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    // shifts: sheet missing
    Mock::given(method("GET"))
        .and(path(values_path("'Смены'!1:1")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "Unable to parse range: 'Смены'!1:1" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v4/spreadsheets/{SPREADSHEET}:batchUpdate")))
        .and(body_partial_json(json!({
            "requests": [{ "addSheet": { "properties": { "title": "Смены" } } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(values_path("'Смены'!A1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let report = store_for(&server).ensure_layout().await.unwrap();
    assert_eq!(report.len(), 3);
    assert!(report[0].contains("ok"), "report: {report:?}");
    assert!(report[1].contains("header row written"), "report: {report:?}");
    assert!(report[2].contains("created sheet"), "report: {report:?}");
}

#[tokio::test]
async fn server_error_mentioning_400_does_not_create_a_sheet() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": 500, "message": "quota 400 of 400 requests used" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v4/spreadsheets/{SPREADSHEET}:batchUpdate")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let err = store_for(&server).ensure_layout().await.unwrap_err();
    assert!(matches!(err, BotError::StoreStatus { status: 500, .. }), "{err:?}");
}

#[tokio::test]
async fn ensure_layout_reports_missing_columns() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["ФИО"]]
        })))
        .mount(&server)
        .await;

    let report = store_for(&server).ensure_layout().await.unwrap();
    assert!(report[0].contains("missing columns: Telegram, Должность"), "report: {report:?}");
}
