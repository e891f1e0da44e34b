use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::AppError;
use crate::store::RouteStore;

const HEADER: [&str; 7] = ["Route", "Driver", "Name", "Address", "Email", "Status", "ETA"];

/// Renders the optimized routes as CSV, one line per delivery in route order.
pub fn export_routes_csv(store: &RouteStore) -> Result<String, AppError> {
    if !store.routes_generated() {
        return Err(AppError::Precondition(
            "routes must be optimized before they can be exported".to_string(),
        ));
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let csv_err = |err: csv::Error| AppError::Internal(format!("failed to write csv: {err}"));

    writer.write_record(HEADER).map_err(csv_err)?;
    for route in store.routes() {
        for delivery in &route.deliveries {
            writer
                .write_record([
                    route.id.as_str(),
                    route.driver_name.as_str(),
                    delivery.name.as_str(),
                    delivery.address.as_str(),
                    delivery.email.as_str(),
                    delivery.status.as_str(),
                    delivery.eta.as_str(),
                ])
                .map_err(csv_err)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| AppError::Internal(format!("failed to flush csv: {err}")))?;
    String::from_utf8(bytes).map_err(|err| AppError::Internal(format!("csv is not utf8: {err}")))
}
