//! HTTP route implementations.

pub mod capture;
pub mod viewer;
