#![no_std]

// Shared logic for the metering node.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and exposing the bus seams the other crates implement.

pub mod bench;
pub mod bus;
pub mod config;
pub mod coulomb;
pub mod payload;
pub mod record;
pub mod sim;
