//! Google Sheets ledger through the v4 values API.

use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ServiceError, TicketError};
use crate::models::config::{RetryPolicy, SheetConfig};
use crate::ticket::{LedgerRow, LedgerSink};

use super::{read_secret, transport_error, with_retry};

const SERVICE: &str = "spreadsheet";

/// Appends ledger rows to one worksheet of a spreadsheet.
pub struct GoogleSheetsSink {
    client: Client,
    base: Url,
    spreadsheet_id: String,
    worksheet: String,
    token: String,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Serialize)]
struct ValueUpdate<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: [[String; 6]; 1],
}

impl GoogleSheetsSink {
    pub fn from_config(config: &SheetConfig, retry: RetryPolicy) -> Result<Self, TicketError> {
        let spreadsheet_id = config
            .spreadsheet_id
            .clone()
            .ok_or_else(|| TicketError::Config("sheet.spreadsheet_id is not set".to_string()))?;
        let token = read_secret(&config.token_env)?;
        let base = Url::parse(&config.base_url)
            .map_err(|e| TicketError::Config(format!("sheet.base_url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(TicketError::Config(format!(
                "sheet.base_url is not a base URL: {base}"
            )));
        }
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TicketError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            spreadsheet_id,
            worksheet: config.worksheet.clone(),
            token,
            timeout,
            retry,
        })
    }

    fn values_url(&self, range: &str) -> Url {
        values_url(&self.base, &self.spreadsheet_id, range)
    }

    fn execute(&self, request: RequestBuilder) -> Result<reqwest::blocking::Response, ServiceError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| transport_error(SERVICE, self.timeout, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(if status.is_server_error() || status.as_u16() == 429 {
            ServiceError::Unavailable {
                service: SERVICE,
                attempts: 1,
                reason: format!("HTTP {status}"),
            }
        } else {
            ServiceError::Rejected {
                service: SERVICE,
                status: status.as_u16(),
                body,
            }
        })
    }
}

impl LedgerSink for GoogleSheetsSink {
    fn next_row(&mut self) -> Result<u32, ServiceError> {
        let url = self.values_url(&sheet_range(&self.worksheet, "A:F"));
        let used = with_retry(&self.retry, SERVICE, || {
            let response = self.execute(self.client.get(url.clone()))?;
            let range: ValueRange = response.json().map_err(|e| ServiceError::Rejected {
                service: SERVICE,
                status: 200,
                body: format!("unreadable value range: {e}"),
            })?;
            Ok(range.values.len())
        })?;

        let next = used as u32 + 1;
        debug!(worksheet = %self.worksheet, next, "Read ledger cursor");
        Ok(next)
    }

    fn write_row(&mut self, row: u32, entry: &LedgerRow) -> Result<(), ServiceError> {
        let range = sheet_range(&self.worksheet, &format!("A{row}:F{row}"));
        let mut url = self.values_url(&range);
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let body = ValueUpdate {
            range: &range,
            major_dimension: "ROWS",
            values: [entry.cells(row)],
        };

        with_retry(&self.retry, SERVICE, || {
            self.execute(self.client.put(url.clone()).json(&body)).map(|_| ())
        })?;

        info!(row, label = %entry.label, "Wrote ledger row");
        Ok(())
    }
}

/// A1 range on a named sheet, quoting the sheet name.
fn sheet_range(worksheet: &str, cells: &str) -> String {
    format!("'{}'!{}", worksheet.replace('\'', "''"), cells)
}

fn values_url(base: &Url, spreadsheet_id: &str, range: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["spreadsheets", spreadsheet_id, "values", range]);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sheet_range_quotes_name() {
        assert_eq!(sheet_range("Sheet1", "A:F"), "'Sheet1'!A:F");
        assert_eq!(sheet_range("Dépenses d'avril", "A3:F3"), "'Dépenses d''avril'!A3:F3");
    }

    #[test]
    fn test_values_url_encodes_range() {
        let base = Url::parse("https://sheets.googleapis.com/v4/").unwrap();
        let url = values_url(&base, "abc", "'Sheet 1'!A:F");
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'Sheet%201'!A:F"
        );
    }

    #[test]
    fn test_empty_value_range_has_no_values() {
        let range: ValueRange = serde_json::from_str(r#"{"range":"Sheet1!A1:F1000"}"#).unwrap();
        assert!(range.values.is_empty());
    }
}
