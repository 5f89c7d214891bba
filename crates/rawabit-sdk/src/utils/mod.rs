//! 工具模块

pub mod time;

pub use time::{local_date, TimezoneConfig};
