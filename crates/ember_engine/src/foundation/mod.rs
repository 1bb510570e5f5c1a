//! Foundation module - math types and frame timing used throughout the engine

pub mod math;
pub mod time;
