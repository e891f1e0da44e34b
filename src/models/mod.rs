pub mod delivery;
pub mod driver;
pub mod location;
pub mod optimization;
pub mod route;
