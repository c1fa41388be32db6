//! Google Sheets v4 REST adapter.
//!
//! Worksheets are read whole through the `values` endpoint and columns are
//! located by header text, so reordering columns in the sheet is harmless.
//! Task ids are 1-based sheet rows (data starts at row 2).

use super::auth::{TokenSource, token_source};
use super::{RemoteStore, dedupe_shifts};
use crate::config::SheetsConfig;
use crate::dates::{self, EMPTY_MARKER, SheetDate};
use crate::error::{BotError, Result};
use crate::model::{Completion, DONE_MARK, Employee, Shift, Task, TaskStatus, normalize_handle};
use crate::policy::next_due_after;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const COL_NAME: &[&str] = &["Название"];
const COL_PERIOD: &[&str] = &["Периодичность"];
const COL_LAST: &[&str] = &["Последняя чистка"];
const COL_NEXT: &[&str] = &["Следующая чистка"];
const COL_BY: &[&str] = &["Выполнил"];
const COL_STATUS: &[&str] = &["Статус"];
const COL_DATE: &[&str] = &["Дата"];
const COL_FULL_NAME: &[&str] = &["ФИО"];
const COL_HANDLE: &[&str] = &["Telegram", "Telegram Username"];
const COL_START: &[&str] = &["Время начала"];
const COL_END: &[&str] = &["Время окончания"];
const COL_POSITION: &[&str] = &["Должность"];

/// Header rows written by [`RemoteStore::ensure_layout`].
pub const TASK_HEADERS: [&str; 6] = [
    "Название",
    "Периодичность",
    "Последняя чистка",
    "Следующая чистка",
    "Выполнил",
    "Статус",
];
pub const SHIFT_HEADERS: [&str; 5] = ["Дата", "ФИО", "Telegram", "Время начала", "Время окончания"];
pub const EMPLOYEE_HEADERS: [&str; 3] = ["ФИО", "Telegram", "Должность"];

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Column lookup built from a header row.
struct Header {
    columns: HashMap<String, usize>,
}

impl Header {
    fn new(row: &[String]) -> Self {
        let columns = row
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().to_lowercase(), idx))
            .collect();
        Self { columns }
    }

    fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn find(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|name| self.columns.get(&name.to_lowercase()).copied())
    }
}

fn cell(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i))
        .map_or("", |value| value.trim())
}

fn optional_text(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty() && raw != EMPTY_MARKER).then(|| raw.to_owned())
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Spreadsheet column letter for a 0-based index (`0` → `A`, `26` → `AA`).
#[must_use]
pub fn column_letter(idx: usize) -> String {
    let mut n = idx + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Google Sheets backed [`RemoteStore`].
pub struct SheetsStore {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    auth: Arc<dyn TokenSource>,
    tasks_sheet: String,
    shifts_sheet: String,
    employees_sheet: String,
}

impl SheetsStore {
    /// Build a store with the credentials and request timeout from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when no usable credentials are configured.
    pub fn new(config: &SheetsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            auth: token_source(config)?,
            tasks_sheet: config.tasks_sheet.clone(),
            shifts_sheet: config.shifts_sheet.clone(),
            employees_sheet: config.employees_sheet.clone(),
        })
    }

    /// Replace the configured credentials.
    #[must_use]
    pub fn with_token_source(mut self, auth: Arc<dyn TokenSource>) -> Self {
        self.auth = auth;
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/v4/spreadsheets/{}", self.base_url, self.spreadsheet_id)
    }

    async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(BotError::StoreStatus {
            status: status.as_u16(),
            message: format!("sheets {what}: {body}"),
        })
    }

    /// Read a range as rows of text cells.
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = format!(
            "{}/values/{}",
            self.spreadsheet_url(),
            urlencoding::encode(range)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        let response = Self::ensure_success(response, "read").await?;
        let body: ValueRange = response.json().await?;
        debug!(range, rows = body.values.len(), "sheet range read");
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    /// Read a whole worksheet, splitting off its header row.
    async fn read_sheet(&self, sheet: &str) -> Result<(Header, Vec<Vec<String>>)> {
        let mut rows = self.read_range(&quote_sheet(sheet)).await?;
        if rows.is_empty() {
            return Ok((Header::new(&[]), Vec::new()));
        }
        let header = Header::new(&rows.remove(0));
        Ok((header, rows))
    }

    async fn write_cells(&self, cells: Vec<(String, String)>) -> Result<()> {
        let data: Vec<Value> = cells
            .into_iter()
            .map(|(range, value)| json!({ "range": range, "values": [[value]] }))
            .collect();
        let body = json!({ "valueInputOption": "RAW", "data": data });
        let response = self
            .client
            .post(format!("{}/values:batchUpdate", self.spreadsheet_url()))
            .bearer_auth(self.auth.bearer().await?)
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response, "batch update").await?;
        Ok(())
    }

    async fn add_sheet(&self, title: &str) -> Result<()> {
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });
        let response = self
            .client
            .post(format!("{}:batchUpdate", self.spreadsheet_url()))
            .bearer_auth(self.auth.bearer().await?)
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response, "add sheet").await?;
        Ok(())
    }

    async fn write_header(&self, sheet: &str, headers: &[&str]) -> Result<()> {
        let range = format!("{}!A1", quote_sheet(sheet));
        let url = format!(
            "{}/values/{}?valueInputOption=RAW",
            self.spreadsheet_url(),
            urlencoding::encode(&range)
        );
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": [headers] });
        let response = self
            .client
            .put(&url)
            .bearer_auth(self.auth.bearer().await?)
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response, "header write").await?;
        Ok(())
    }

    async fn ensure_sheet(&self, sheet: &str, headers: &[&str]) -> Result<String> {
        let first_row = match self.read_range(&format!("{}!1:1", quote_sheet(sheet))).await {
            Ok(rows) => rows.into_iter().next().unwrap_or_default(),
            // Sheets answers 400 for a range on a worksheet that does not exist.
            Err(BotError::StoreStatus { status: 400, .. }) => {
                self.add_sheet(sheet).await?;
                self.write_header(sheet, headers).await?;
                return Ok(format!("+ created sheet '{sheet}'"));
            }
            Err(err) => return Err(err),
        };

        if first_row.iter().all(|c| c.trim().is_empty()) {
            self.write_header(sheet, headers).await?;
            return Ok(format!("↻ sheet '{sheet}': header row written"));
        }

        let header = Header::new(&first_row);
        let missing: Vec<&str> = headers
            .iter()
            .copied()
            .filter(|name| header.find(&[name]).is_none())
            .collect();
        if missing.is_empty() {
            Ok(format!("✓ sheet '{sheet}' ok"))
        } else {
            Ok(format!(
                "! sheet '{sheet}' is missing columns: {}",
                missing.join(", ")
            ))
        }
    }
}

#[async_trait]
impl RemoteStore for SheetsStore {
    fn id(&self) -> &'static str {
        "sheets"
    }

    async fn fetch_tasks(&self) -> Result<Vec<Task>> {
        let (header, rows) = self.read_sheet(&self.tasks_sheet).await?;
        let name_col = header.find(COL_NAME).ok_or_else(|| {
            BotError::Store(format!("sheet '{}' has no name column", self.tasks_sheet))
        })?;
        let period_col = header.find(COL_PERIOD);
        let last_col = header.find(COL_LAST);
        let next_col = header.find(COL_NEXT);
        let by_col = header.find(COL_BY);
        let status_col = header.find(COL_STATUS);

        let mut tasks = Vec::with_capacity(rows.len());
        for (offset, row) in rows.iter().enumerate() {
            let name = cell(row, Some(name_col));
            if name.is_empty() {
                continue;
            }
            let Ok(id) = u32::try_from(offset + 2) else {
                break;
            };
            tasks.push(Task {
                id,
                name: name.to_owned(),
                period: cell(row, period_col).to_owned(),
                last_completed_date: SheetDate::parse(cell(row, last_col)),
                next_due_date: SheetDate::parse(cell(row, next_col)),
                status: TaskStatus::from_cell(cell(row, status_col)),
                completed_by: optional_text(cell(row, by_col)),
                completed_at: None,
            });
        }
        info!(count = tasks.len(), "loaded equipment tasks");
        Ok(tasks)
    }

    async fn fetch_shifts(&self, date: NaiveDate) -> Result<Vec<Shift>> {
        let (header, rows) = self.read_sheet(&self.shifts_sheet).await?;
        let date_col = header.find(COL_DATE);
        let name_col = header.find(COL_FULL_NAME);
        let handle_col = header.find(COL_HANDLE);
        let start_col = header.find(COL_START);
        let end_col = header.find(COL_END);
        if date_col.is_none() || handle_col.is_none() {
            return Err(BotError::Store(format!(
                "sheet '{}' needs date and Telegram columns",
                self.shifts_sheet
            )));
        }

        let shifts: Vec<Shift> = rows
            .iter()
            .filter(|row| dates::parse_date(cell(row, date_col)) == Some(date))
            .filter(|row| !cell(row, handle_col).is_empty())
            .map(|row| {
                Shift::new(cell(row, name_col), cell(row, handle_col), date).with_times(
                    dates::parse_time(cell(row, start_col)),
                    dates::parse_time(cell(row, end_col)),
                )
            })
            .collect();
        let shifts = dedupe_shifts(shifts);
        info!(count = shifts.len(), date = %dates::format_date(date), "loaded shifts");
        Ok(shifts)
    }

    async fn persist_completion(&self, completion: &Completion) -> Result<bool> {
        if completion.task_id < 2 {
            warn!(task_id = completion.task_id, "refusing to write into the header row");
            return Ok(false);
        }
        let header_rows = self
            .read_range(&format!("{}!1:1", quote_sheet(&self.tasks_sheet)))
            .await?;
        let header = Header::new(header_rows.first().map_or(&[][..], Vec::as_slice));
        let (Some(last), Some(next), Some(by), Some(status)) = (
            header.find(COL_LAST),
            header.find(COL_NEXT),
            header.find(COL_BY),
            header.find(COL_STATUS),
        ) else {
            warn!(sheet = %self.tasks_sheet, "task sheet is missing completion columns");
            return Ok(false);
        };

        let completed_on = completion.completed_at.date_naive();
        let next_due = next_due_after(completed_on, &completion.period)
            .map_or_else(|| EMPTY_MARKER.to_owned(), dates::format_date);
        let sheet = quote_sheet(&self.tasks_sheet);
        let row = completion.task_id;
        let at = |col: usize| format!("{sheet}!{}{row}", column_letter(col));

        self.write_cells(vec![
            (at(last), dates::format_date(completed_on)),
            (at(next), next_due),
            (at(by), completion.completed_by.clone()),
            (at(status), DONE_MARK.to_owned()),
        ])
        .await?;
        info!(
            task_id = row,
            by = %completion.completed_by,
            at = %completion.completed_at.format("%H:%M"),
            "task completion written to sheet"
        );
        Ok(true)
    }

    async fn fetch_employees(&self) -> Result<Vec<Employee>> {
        let (header, rows) = self.read_sheet(&self.employees_sheet).await?;
        if header.is_empty() {
            return Ok(Vec::new());
        }
        let name_col = header.find(COL_FULL_NAME);
        let handle_col = header.find(COL_HANDLE);
        let position_col = header.find(COL_POSITION);
        if name_col.is_none() || handle_col.is_none() {
            return Err(BotError::Store(format!(
                "sheet '{}' needs name and Telegram columns",
                self.employees_sheet
            )));
        }

        Ok(rows
            .iter()
            .filter(|row| !cell(row, handle_col).is_empty())
            .map(|row| Employee {
                name: cell(row, name_col).to_owned(),
                handle: normalize_handle(cell(row, handle_col)),
                position: optional_text(cell(row, position_col)),
            })
            .collect())
    }

    async fn ensure_layout(&self) -> Result<Vec<String>> {
        let mut report = Vec::with_capacity(3);
        report.push(self.ensure_sheet(&self.employees_sheet, &EMPLOYEE_HEADERS).await?);
        report.push(self.ensure_sheet(&self.tasks_sheet, &TASK_HEADERS).await?);
        report.push(self.ensure_sheet(&self.shifts_sheet, &SHIFT_HEADERS).await?);
        Ok(report)
    }
}
