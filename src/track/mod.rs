pub mod connection;
pub mod tracker;

pub use connection::{Connection, ConnectionMap, ConnectionState};
pub use tracker::{Tracker, TrackerConfig};
