pub mod backup_store;
pub mod gateway;
pub mod local_gateway;
pub mod location;
pub mod presign;
