use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::location::NamedLocation;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Link to an external identity provider account, if any.
    #[serde(default)]
    pub identity_sub: Option<String>,
    #[serde(default)]
    pub start_location: Option<NamedLocation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDriver {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub identity_sub: Option<String>,
    #[serde(default)]
    pub start_location: Option<NamedLocation>,
}

impl NewDriver {
    pub fn into_driver(self, id: String) -> Driver {
        let now = Utc::now();
        Driver {
            id,
            name: self.name,
            email: self.email,
            phone_number: self.phone_number,
            identity_sub: self.identity_sub,
            start_location: self.start_location,
            created_at: now,
            updated_at: now,
        }
    }
}
