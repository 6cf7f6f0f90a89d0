//! Unit tests for the CAD router
//!
//! This module contains tests that drive several components together
//! through fake CAD handles.

pub mod support;

pub mod pool_tests;
pub mod router_tests;
