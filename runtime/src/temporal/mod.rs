//! Time-series state: the persisted subscriber history.

pub mod history;
