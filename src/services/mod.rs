pub mod email;
pub mod geocoding;
pub mod persistence;
pub mod vrp;
