pub mod alert;
pub mod broadcast;
pub mod job;
pub mod location;
pub mod profile;
