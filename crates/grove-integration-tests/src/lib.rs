//! Integration test crate for the Grove protocol.
//!
//! This crate has no library code. It only contains integration tests
//! that drive vaults, the router and the secondary pools together over one
//! shared bank.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p grove-integration-tests
//! ```
