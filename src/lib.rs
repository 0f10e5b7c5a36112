//! Map region cache library
//!
//! Per-dimension cache of rendered map regions and waypoints, with lazy
//! loading from disk and background persistence.

pub mod config;
pub mod map;
