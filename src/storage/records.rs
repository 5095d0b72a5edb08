//! Persisted record types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ident::Md5Hash;

/// Registration state of one type within a module version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub type_name: String,
    /// `<major>.<minor>` of the newest saved version of this type.
    pub type_version: String,
    /// False once the type has been unregistered (tombstone).
    pub supported: bool,
}

/// Registration state of one function within a module version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncInfo {
    pub func_name: String,
    pub func_version: String,
    pub supported: bool,
}

/// One committed snapshot of a module.
///
/// The first record of a module (written on registration approval) carries
/// no spec and empty type/function maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub module_name: String,
    /// Monotonic per-module commit timestamp.
    pub version_time: u64,
    /// MD5 of the canonical module AST; absent on the bootstrap record.
    pub md5_hash: Option<Md5Hash>,
    pub description: String,
    pub upload_user_id: Option<String>,
    pub upload_method: Option<String>,
    pub upload_comment: String,
    pub released: bool,
    /// Pinned versions of every directly included module.
    pub included_module_name_to_version: BTreeMap<String, u64>,
    pub types: BTreeMap<String, TypeInfo>,
    pub funcs: BTreeMap<String, FuncInfo>,
}

impl ModuleInfo {
    /// Bootstrap record for a freshly approved module.
    pub fn bootstrap(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            version_time: 0,
            md5_hash: None,
            description: String::new(),
            upload_user_id: None,
            upload_method: None,
            upload_comment: String::new(),
            released: true,
            included_module_name_to_version: BTreeMap::new(),
            types: BTreeMap::new(),
            funcs: BTreeMap::new(),
        }
    }
}

/// A module owner, or a pending registration request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub module_name: String,
    pub owner_user_id: String,
    pub with_change_owners_privilege: bool,
}

/// A directed dependency between two versioned entities: the dep entity
/// (type or function) depends on the ref type.
///
/// Stored refs always carry concrete versions; `None` only occurs
/// transiently while a save is collecting refs for the version being
/// committed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefInfo {
    pub dep_module: String,
    pub dep_name: String,
    pub dep_version: Option<String>,
    /// `versionTime` of the module version the dep entity was saved in.
    pub dep_module_version: u64,
    pub ref_module: String,
    pub ref_name: String,
    pub ref_version: Option<String>,
}
