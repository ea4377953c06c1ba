//! Integration test suite for oss-update
//!
//! End-to-end tests that run the `oss-update` binary against a release
//! server laid out on disk and served over `file://`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **check**: `oss-update check` reporting
//! - **config_command**: `config init`, `show` and `path`
//! - **update_flow**: full update runs, checksum failures, relaunch

#[path = "../common/mod.rs"]
mod common;

mod check;
mod config_command;
mod update_flow;
