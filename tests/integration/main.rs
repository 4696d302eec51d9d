//! Integration Tests
//!
//! End-to-end tests through the public `mosaic` facade:
//! - Scenarios: containers composing over changing catalogs
//! - Directories: manifest directories plugged into a container

#[path = "../common/mod.rs"]
mod common;

mod directories;
mod scenarios;
