//! Types for wrapping the raw API.

pub mod abs;
pub mod enums;
pub mod structs;
