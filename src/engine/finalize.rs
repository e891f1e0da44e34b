use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::services::email::DeliveryNotification;
use crate::state::AppState;
use crate::store::RouteStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationFailure {
    pub delivery_id: String,
    pub to: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FinalizeReport {
    pub sent: usize,
    pub failures: Vec<NotificationFailure>,
}

/// One notification per delivery on a driver route, in route order.
pub fn notifications(store: &RouteStore) -> Result<Vec<(String, DeliveryNotification)>, AppError> {
    if !store.routes_generated() {
        return Err(AppError::Precondition(
            "routes must be optimized before they can be finalized".to_string(),
        ));
    }

    Ok(store
        .routes()
        .iter()
        .filter(|route| !route.is_unassigned())
        .flat_map(|route| {
            route.deliveries.iter().map(move |delivery| {
                let notification = DeliveryNotification {
                    to: delivery.email.clone(),
                    customer_name: delivery.name.clone(),
                    eta: delivery.eta.clone(),
                    summary: format!("{} with {}", delivery.address, route.driver_name),
                };
                (delivery.id.clone(), notification)
            })
        })
        .collect())
}

/// Sends every notification one at a time. A failed recipient is recorded
/// and skipped.
pub async fn finalize_routes(state: &AppState) -> Result<FinalizeReport, AppError> {
    let pending = {
        let store = state.store.lock().await;
        notifications(&store)?
    };

    let mut report = FinalizeReport {
        sent: 0,
        failures: Vec::new(),
    };

    for (delivery_id, notification) in pending {
        match state.services.email.send(&notification).await {
            Ok(()) => {
                report.sent += 1;
                state
                    .metrics
                    .notifications_total
                    .with_label_values(&["sent"])
                    .inc();
            }
            Err(err) => {
                warn!(delivery_id = %delivery_id, to = %notification.to, error = %err, "notification failed");
                state
                    .metrics
                    .notifications_total
                    .with_label_values(&["failed"])
                    .inc();
                report.failures.push(NotificationFailure {
                    delivery_id,
                    to: notification.to,
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        sent = report.sent,
        failed = report.failures.len(),
        "routes finalized"
    );
    Ok(report)
}
