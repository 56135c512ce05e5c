//! An in-process GATT client that never touches a radio.
//!
//! Useful for testing code built on top of [`Characteristic`][crate::characteristic::Characteristic]:
//! every request is recorded and the test gets to decide which descriptors a
//! discovery finds and how requests complete.

pub mod client;
