//! typedefdb - a versioned type-definition database
//!
//! Modules of typed-object schemas are compiled from a spec language,
//! diffed against their stored versions, and saved under compatibility-
//! aware `<major>.<minor>` versions, with per-module reader/writer locking
//! and transactional rollback.

pub mod ast;
pub mod compat;
pub mod config;
pub mod ident;
pub mod lock;
pub mod parser;
pub mod registry;
pub mod storage;
pub mod users;
