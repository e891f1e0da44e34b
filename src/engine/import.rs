//! Bulk delivery import from CSV text.

use std::collections::BTreeMap;
use std::time::Duration;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::mutations::{persist, DeliveryInput};
use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::state::{AppState, ChangeKind};

const REQUIRED_COLUMNS: [&str; 3] = ["name", "address", "email"];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RowFailure {
    /// 1-based data row, not counting the header.
    pub row: usize,
    pub record: BTreeMap<String, String>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportReport {
    pub accepted_count: usize,
    /// Rows refused for missing or malformed fields.
    pub rejected_count: usize,
    /// Every row that did not make it in, with the reason.
    pub failures: Vec<RowFailure>,
    pub deliveries: Vec<Delivery>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub row: usize,
    pub record: BTreeMap<String, String>,
    pub input: Result<DeliveryInput, String>,
}

struct Columns {
    name: usize,
    address: usize,
    email: usize,
    lat: Option<usize>,
    lng: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, AppError> {
        let find = |column: &str| {
            headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(column))
        };

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .into_iter()
            .filter(|column| find(column).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "csv is missing required columns: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            name: find("name").unwrap_or_default(),
            address: find("address").unwrap_or_default(),
            email: find("email").unwrap_or_default(),
            lat: find("lat"),
            lng: find("lng"),
        })
    }

    fn input(&self, record: &StringRecord) -> DeliveryInput {
        let text = |index: usize| record.get(index).unwrap_or_default().to_string();
        let coordinate = |index: Option<usize>| {
            index
                .and_then(|i| record.get(i))
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|value| value.is_finite())
        };

        DeliveryInput {
            name: text(self.name),
            address: text(self.address),
            email: text(self.email),
            lat: coordinate(self.lat),
            lng: coordinate(self.lng),
            ..DeliveryInput::default()
        }
    }
}

/// Splits CSV text into validated rows. Fails only when the header itself is
/// unusable; bad rows come back as `Err` inputs.
pub fn parse_rows(csv_text: &str) -> Result<Vec<ParsedRow>, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(csv_text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|err| AppError::Validation(format!("unreadable csv header: {err}")))?
        .clone();
    let columns = Columns::from_headers(&headers)?;

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        let parsed = match result {
            Ok(record) => {
                let echo = headers
                    .iter()
                    .zip(record.iter())
                    .map(|(header, value)| (header.to_string(), value.to_string()))
                    .collect();
                let input = columns.input(&record);
                let input = match input.validate() {
                    Ok(()) => Ok(input),
                    Err(err) => Err(err.to_string()),
                };
                ParsedRow {
                    row,
                    record: echo,
                    input,
                }
            }
            Err(err) => ParsedRow {
                row,
                record: BTreeMap::new(),
                input: Err(format!("malformed csv row: {err}")),
            },
        };
        rows.push(parsed);
    }

    Ok(rows)
}

/// Geocodes and persists each accepted row in order, then adds the
/// persisted deliveries to the unassigned pool in one store command.
pub async fn import_csv(state: &AppState, csv_text: &str) -> Result<ImportReport, AppError> {
    let rows = parse_rows(csv_text)?;
    let geocode_interval = state.settings.geocode_interval;

    let mut report = ImportReport {
        accepted_count: 0,
        rejected_count: 0,
        failures: Vec::new(),
        deliveries: Vec::new(),
    };
    let mut geocoded_any = false;

    for parsed in rows {
        let input = match parsed.input {
            Ok(input) => input,
            Err(error) => {
                warn!(row = parsed.row, error = %error, "csv row rejected");
                report.rejected_count += 1;
                report.failures.push(RowFailure {
                    row: parsed.row,
                    record: parsed.record,
                    error,
                });
                continue;
            }
        };

        if input.coordinates().is_none() {
            pause_between_geocodes(&mut geocoded_any, geocode_interval).await;
        }

        let outcome = async {
            let location = input
                .resolve_location(state.services.geocoder.as_ref())
                .await?;
            let new_delivery = input.into_new_delivery(location);
            persist(
                state,
                "import_row",
                state.services.repository.create_delivery(new_delivery),
            )
            .await
        }
        .await;

        match outcome {
            Ok(delivery) => report.deliveries.push(delivery),
            Err(err) => {
                warn!(row = parsed.row, error = %err, "csv row failed");
                report.failures.push(RowFailure {
                    row: parsed.row,
                    record: parsed.record,
                    error: err.to_string(),
                });
            }
        }
    }

    report.accepted_count = report.deliveries.len();
    let failed = report.failures.len() - report.rejected_count;

    let metrics = &state.metrics.import_rows_total;
    metrics
        .with_label_values(&["accepted"])
        .inc_by(report.accepted_count as u64);
    metrics
        .with_label_values(&["rejected"])
        .inc_by(report.rejected_count as u64);
    metrics.with_label_values(&["failed"]).inc_by(failed as u64);

    if !report.deliveries.is_empty() {
        let mut store = state.store.lock().await;
        store.add_deliveries(report.deliveries.clone(), None);
        state.publish(&store, ChangeKind::DeliveriesImported);
    }

    info!(
        accepted = report.accepted_count,
        rejected = report.rejected_count,
        failed,
        "csv import finished"
    );

    Ok(report)
}

async fn pause_between_geocodes(geocoded_any: &mut bool, interval: Duration) {
    if *geocoded_any && !interval.is_zero() {
        tokio::time::sleep(interval).await;
    }
    *geocoded_any = true;
}
