//! Tests that need a real bench controller; ignored by default.

pub mod bench_tests;
pub mod utils;
