//! Storage Port: the persistence contract the registry core consumes.
//!
//! All mutations are single-key atomic; the registry composes multi-write
//! operations into a logical transaction stamped with one `versionTime` and
//! rolls the whole stamp back on failure. Writes are idempotent on
//! `(module, versionTime, entityKey)`.
//!
//! Two implementations ship with the crate: `MemoryStorage` and
//! `FileStorage` (a JSON snapshot per data directory).

mod errors;
mod file;
mod memory;
mod records;
mod state;

use std::collections::{BTreeMap, BTreeSet};

pub use errors::{StorageResult, TypeStorageError};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use records::{FuncInfo, ModuleInfo, OwnerInfo, RefInfo, TypeInfo};

/// Persistence operations required by the registry core.
pub trait TypeStorage: Send + Sync {
    // --- modules ---

    fn check_module_exists(&self, module: &str) -> StorageResult<bool>;

    /// Create a module record with its bootstrap version (no spec, empty
    /// type and function maps). Returns the bootstrap `versionTime`.
    fn init_module_info_record(&self, module: &str) -> StorageResult<u64>;

    /// All committed `versionTime`s with their released flags.
    fn get_all_module_versions(&self, module: &str) -> StorageResult<BTreeMap<u64, bool>>;

    fn get_last_released_module_version(&self, module: &str) -> StorageResult<u64>;

    fn get_last_module_version_with_unreleased(&self, module: &str) -> StorageResult<u64>;

    /// Reserve a fresh `versionTime`, strictly greater than any committed
    /// or previously reserved one.
    fn generate_new_module_version(&self, module: &str) -> StorageResult<u64>;

    fn write_module_records(
        &self,
        info: &ModuleInfo,
        spec: &str,
        version_time: u64,
    ) -> StorageResult<()>;

    fn get_module_info_record(&self, module: &str, version: u64) -> StorageResult<ModuleInfo>;

    fn get_module_spec_record(&self, module: &str, version: u64) -> StorageResult<String>;

    fn check_module_info_record_exists(&self, module: &str, version: u64) -> StorageResult<bool>;

    fn check_module_spec_record_exists(&self, module: &str, version: u64) -> StorageResult<bool>;

    fn set_module_release_version(&self, module: &str, version: u64) -> StorageResult<()>;

    /// Delete every record stamped with `version` and revert the module
    /// head to `previous`.
    fn remove_module_version_and_switch_if_not_current(
        &self,
        module: &str,
        version: u64,
        previous: u64,
    ) -> StorageResult<()>;

    fn get_module_supported_state(&self, module: &str) -> StorageResult<bool>;

    fn change_module_supported_state(&self, module: &str, supported: bool) -> StorageResult<()>;

    fn remove_module(&self, module: &str) -> StorageResult<()>;

    fn get_all_registered_modules(&self, include_unsupported: bool) -> StorageResult<Vec<String>>;

    // --- types and functions ---

    fn write_type_schema_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
        md5: &str,
    ) -> StorageResult<()>;

    fn write_type_parse_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
    ) -> StorageResult<()>;

    fn write_func_parse_record(
        &self,
        module: &str,
        func_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
    ) -> StorageResult<()>;

    fn get_type_schema_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>>;

    fn get_type_parse_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>>;

    fn get_func_parse_record(
        &self,
        module: &str,
        func_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>>;

    fn check_type_schema_record_exists(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<bool>;

    /// Every stored version of a type with its released flag (a type
    /// version is released when a released module version contains it).
    fn get_all_type_versions(
        &self,
        module: &str,
        type_name: &str,
    ) -> StorageResult<BTreeMap<String, bool>>;

    fn get_type_versions_by_md5(
        &self,
        module: &str,
        type_name: &str,
        md5: &str,
    ) -> StorageResult<Vec<String>>;

    fn get_type_md5(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>>;

    fn get_module_versions_for_type_version(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<BTreeMap<u64, bool>>;

    // --- refs ---

    fn add_refs(
        &self,
        type_refs: &BTreeSet<RefInfo>,
        func_refs: &BTreeSet<RefInfo>,
    ) -> StorageResult<()>;

    fn get_type_refs_by_dep(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> StorageResult<BTreeSet<RefInfo>>;

    fn get_type_refs_by_ref(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> StorageResult<BTreeSet<RefInfo>>;

    fn get_func_refs_by_dep(
        &self,
        module: &str,
        name: &str,
        version: Option<&str>,
    ) -> StorageResult<BTreeSet<RefInfo>>;

    fn get_func_refs_by_ref(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> StorageResult<BTreeSet<RefInfo>>;

    // --- owners and registration requests ---

    fn get_owners_for_module(&self, module: &str) -> StorageResult<BTreeMap<String, OwnerInfo>>;

    fn add_owner_to_module(
        &self,
        module: &str,
        user: &str,
        with_change_owners_privilege: bool,
    ) -> StorageResult<()>;

    fn remove_owner_from_module(&self, module: &str, user: &str) -> StorageResult<()>;

    fn get_modules_for_owner(&self, user: &str) -> StorageResult<Vec<String>>;

    fn add_new_module_registration_request(&self, module: &str, user: &str) -> StorageResult<()>;

    fn get_new_module_registration_requests(&self) -> StorageResult<Vec<OwnerInfo>>;

    fn get_owner_for_new_module_registration_request(&self, module: &str)
        -> StorageResult<String>;

    fn remove_new_module_registration_request(&self, module: &str, user: &str)
        -> StorageResult<()>;
}
