//! NimiSora - host process for the NimiSora desktop shell
//!
//! This library provides the leveled file logger, the SQLite-backed
//! configuration and log stores, and the command bridge the UI talks to.

pub mod bridge;
pub mod config;
pub mod logging;
pub mod store;
