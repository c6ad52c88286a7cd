//! Boot-time information
//!
//! - `core_info`: physical layout handed over by the previous boot stage

pub mod core_info;

pub use core_info::CoreInfo;
