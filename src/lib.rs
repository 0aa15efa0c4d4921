//! SeaWatch - lifecycle management for hosted maritime simulations

pub mod api;
pub mod core;
pub mod session;
