use serde::{Deserialize, Serialize};

use crate::models::location::GeoPoint;

pub const STATUS_PENDING: &str = "Pending";
pub const STATUS_SCHEDULED: &str = "Scheduled";
pub const ETA_UNSET: &str = "N/A";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delivery {
    pub id: String,
    pub name: String,
    pub address: String,
    pub email: String,
    pub location: GeoPoint,
    pub status: String,
    pub eta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Service time at the stop, in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// Delivery fields supplied by the dispatcher before persistence assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDelivery {
    pub name: String,
    pub address: String,
    pub email: String,
    pub location: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

impl NewDelivery {
    pub fn into_delivery(self, id: String) -> Delivery {
        Delivery {
            id,
            name: self.name,
            address: self.address,
            email: self.email,
            location: self.location,
            status: STATUS_PENDING.to_string(),
            eta: ETA_UNSET.to_string(),
            photo_url: self.photo_url,
            notes: self.notes,
            duration: self.duration,
        }
    }
}
