//! Employee contact directory.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ContactDirectoryConfig;
use crate::models::Contact;

const MAX_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Source of alert recipients. An empty directory is a valid answer.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn fetch_active_contacts(&self) -> anyhow::Result<Vec<Contact>>;
}

/// Fixed in-process contact list.
#[derive(Debug, Clone, Default)]
pub struct StaticContactDirectory {
    contacts: Vec<Contact>,
}

impl StaticContactDirectory {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }
}

#[async_trait]
impl ContactDirectory for StaticContactDirectory {
    async fn fetch_active_contacts(&self) -> anyhow::Result<Vec<Contact>> {
        Ok(self.contacts.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Employee roster kept in a Google spreadsheet.
///
/// Columns: A department, B name, C phone, D emergency role, E emergency duty.
/// The first row is a header.
pub struct SheetsContactDirectory {
    client: Client,
    api_base: String,
    spreadsheet_id: String,
    api_key: String,
    retry_delay: Duration,
}

impl SheetsContactDirectory {
    pub fn new(config: &ContactDirectoryConfig, timeout: Duration) -> anyhow::Result<Self> {
        let (Some(api_key), Some(spreadsheet_id)) = (
            config.sheets_api_key.clone(),
            config.employee_spreadsheet_id.clone(),
        ) else {
            anyhow::bail!("spreadsheet contact directory is not configured");
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Sheets HTTP client")?;

        Ok(Self {
            client,
            api_base: config.sheets_api_base.trim_end_matches('/').to_string(),
            spreadsheet_id,
            api_key,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Base delay between attempts; the n-th retry waits `n * delay`.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn fetch_rows(&self) -> anyhow::Result<Vec<Vec<String>>> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/A:Z",
            self.api_base, self.spreadsheet_id
        );

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .context("Sheets request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Sheets API returned {status}: {body}");
        }

        let range: ValueRange = response
            .json()
            .await
            .context("Sheets API returned malformed JSON")?;
        Ok(range.values)
    }
}

#[async_trait]
impl ContactDirectory for SheetsContactDirectory {
    async fn fetch_active_contacts(&self) -> anyhow::Result<Vec<Contact>> {
        let mut attempt = 1;
        loop {
            match self.fetch_rows().await {
                Ok(rows) => {
                    let contacts = contacts_from_rows(&rows);
                    debug!(rows = rows.len(), contacts = contacts.len(), "Loaded contact sheet");
                    return Ok(contacts);
                }
                Err(err) if attempt < MAX_ATTEMPTS => {
                    warn!(attempt, error = %err, "Contact sheet fetch failed, retrying");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "contact sheet fetch failed after {MAX_ATTEMPTS} attempts"
                    )));
                }
            }
        }
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(|v| v.trim()).unwrap_or_default()
}

fn optional_cell(row: &[String], index: usize) -> Option<String> {
    Some(cell(row, index))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Converts sheet rows (header first) into contacts. Rows without a name or a
/// phone number are skipped; ids keep the row position.
pub fn contacts_from_rows(rows: &[Vec<String>]) -> Vec<Contact> {
    rows.iter()
        .skip(1)
        .enumerate()
        .filter_map(|(index, row)| {
            let name = cell(row, 1);
            let phone = cell(row, 2).replace('-', "");
            if name.is_empty() || phone.is_empty() {
                return None;
            }

            Some(Contact {
                id: format!("emp-{:03}", index + 1),
                name: name.to_string(),
                phone,
                department: cell(row, 0).to_string(),
                is_active: true,
                emergency_role_description: optional_cell(row, 3),
                emergency_duty: optional_cell(row, 4),
            })
        })
        .collect()
}
