//! Common test utilities for visit-counter
//!
//! This module provides shared testing infrastructure including:
//! - An in-memory fake store with failure and latency injection
//! - WireMock setup for the HTTP counter store
//! - Settings and counter fixtures
//!
//! # Usage
//!
//! ```rust
//! mod common;
//! use common::fixtures::*;
//! ```

#![allow(dead_code)]

pub mod fake_store;
pub mod fixtures;
pub mod mock_server;
