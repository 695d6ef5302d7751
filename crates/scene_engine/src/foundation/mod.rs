//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the scene engine:
//! - Math types and matrix construction
//! - Arena collections for scene nodes
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod logging;
