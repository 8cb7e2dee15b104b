pub mod compactor;
pub mod config;
pub mod detect;
pub mod engine;
pub mod label;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod roster;
pub mod wal;
