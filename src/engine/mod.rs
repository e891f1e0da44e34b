pub mod export;
pub mod finalize;
pub mod import;
pub mod mapper;
pub mod mutations;
pub mod optimize;
pub mod request;
pub mod summary;
