//! Foundation utilities shared by every subsystem of the core.

pub mod ident;
pub mod logging;
pub mod math;
