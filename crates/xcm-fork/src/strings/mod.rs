// SPDX-License-Identifier: GPL-3.0

//! Centralized string constants for the xcm-fork crate.
//!
//! This module organizes static strings used throughout the crate to improve
//! maintainability and avoid magic strings scattered across the codebase.

pub mod cache;
pub mod config;
pub mod inherent;
pub mod logging;
pub mod relay;
pub mod rpc;
pub mod storage;
