//! Convoy detector library
//!
//! Finds pairs of vehicles that ALPR readers repeatedly see travelling
//! together. Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
