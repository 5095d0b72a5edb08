//! In-memory Storage Port backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::errors::StorageResult;
use super::records::{ModuleInfo, OwnerInfo, RefInfo};
use super::state::State;
use super::TypeStorage;

/// Registry storage held entirely in memory. The backend of choice for
/// tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> StorageResult<T>) -> StorageResult<T> {
        f(&mut self.state.lock().unwrap())
    }
}

impl TypeStorage for MemoryStorage {
    fn check_module_exists(&self, module: &str) -> StorageResult<bool> {
        Ok(self.read(|s| s.check_module_exists(module)))
    }

    fn init_module_info_record(&self, module: &str) -> StorageResult<u64> {
        self.mutate(|s| s.init_module_info_record(module))
    }

    fn get_all_module_versions(&self, module: &str) -> StorageResult<BTreeMap<u64, bool>> {
        self.read(|s| s.get_all_module_versions(module))
    }

    fn get_last_released_module_version(&self, module: &str) -> StorageResult<u64> {
        self.read(|s| s.get_last_released_module_version(module))
    }

    fn get_last_module_version_with_unreleased(&self, module: &str) -> StorageResult<u64> {
        self.read(|s| s.get_last_module_version_with_unreleased(module))
    }

    fn generate_new_module_version(&self, module: &str) -> StorageResult<u64> {
        self.mutate(|s| s.generate_new_module_version(module))
    }

    fn write_module_records(
        &self,
        info: &ModuleInfo,
        spec: &str,
        version_time: u64,
    ) -> StorageResult<()> {
        self.mutate(|s| s.write_module_records(info, spec, version_time))
    }

    fn get_module_info_record(&self, module: &str, version: u64) -> StorageResult<ModuleInfo> {
        self.read(|s| s.get_module_info_record(module, version))
    }

    fn get_module_spec_record(&self, module: &str, version: u64) -> StorageResult<String> {
        self.read(|s| s.get_module_spec_record(module, version))
    }

    fn check_module_info_record_exists(&self, module: &str, version: u64) -> StorageResult<bool> {
        Ok(self.read(|s| s.check_module_info_record_exists(module, version)))
    }

    fn check_module_spec_record_exists(&self, module: &str, version: u64) -> StorageResult<bool> {
        Ok(self.read(|s| s.check_module_spec_record_exists(module, version)))
    }

    fn set_module_release_version(&self, module: &str, version: u64) -> StorageResult<()> {
        self.mutate(|s| s.set_module_release_version(module, version))
    }

    fn remove_module_version_and_switch_if_not_current(
        &self,
        module: &str,
        version: u64,
        _previous: u64,
    ) -> StorageResult<()> {
        self.mutate(|s| s.remove_module_version(module, version))
    }

    fn get_module_supported_state(&self, module: &str) -> StorageResult<bool> {
        self.read(|s| s.get_module_supported_state(module))
    }

    fn change_module_supported_state(&self, module: &str, supported: bool) -> StorageResult<()> {
        self.mutate(|s| s.change_module_supported_state(module, supported))
    }

    fn remove_module(&self, module: &str) -> StorageResult<()> {
        self.mutate(|s| s.remove_module(module))
    }

    fn get_all_registered_modules(&self, include_unsupported: bool) -> StorageResult<Vec<String>> {
        Ok(self.read(|s| s.get_all_registered_modules(include_unsupported)))
    }

    fn write_type_schema_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
        md5: &str,
    ) -> StorageResult<()> {
        self.mutate(|s| {
            s.write_type_schema_record(module, type_name, version, module_version, document, md5)
        })
    }

    fn write_type_parse_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
    ) -> StorageResult<()> {
        self.mutate(|s| {
            s.write_type_parse_record(module, type_name, version, module_version, document)
        })
    }

    fn write_func_parse_record(
        &self,
        module: &str,
        func_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
    ) -> StorageResult<()> {
        self.mutate(|s| {
            s.write_func_parse_record(module, func_name, version, module_version, document)
        })
    }

    fn get_type_schema_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>> {
        Ok(self.read(|s| s.get_type_schema_record(module, type_name, version)))
    }

    fn get_type_parse_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>> {
        Ok(self.read(|s| s.get_type_parse_record(module, type_name, version)))
    }

    fn get_func_parse_record(
        &self,
        module: &str,
        func_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>> {
        Ok(self.read(|s| s.get_func_parse_record(module, func_name, version)))
    }

    fn check_type_schema_record_exists(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<bool> {
        Ok(self.read(|s| s.check_type_schema_record_exists(module, type_name, version)))
    }

    fn get_all_type_versions(
        &self,
        module: &str,
        type_name: &str,
    ) -> StorageResult<BTreeMap<String, bool>> {
        Ok(self.read(|s| s.get_all_type_versions(module, type_name)))
    }

    fn get_type_versions_by_md5(
        &self,
        module: &str,
        type_name: &str,
        md5: &str,
    ) -> StorageResult<Vec<String>> {
        Ok(self.read(|s| s.get_type_versions_by_md5(module, type_name, md5)))
    }

    fn get_type_md5(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>> {
        Ok(self.read(|s| s.get_type_md5(module, type_name, version)))
    }

    fn get_module_versions_for_type_version(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<BTreeMap<u64, bool>> {
        Ok(self.read(|s| s.get_module_versions_for_type_version(module, type_name, version)))
    }

    fn add_refs(
        &self,
        type_refs: &BTreeSet<RefInfo>,
        func_refs: &BTreeSet<RefInfo>,
    ) -> StorageResult<()> {
        self.mutate(|s| {
            s.add_refs(type_refs, func_refs);
            Ok(())
        })
    }

    fn get_type_refs_by_dep(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> StorageResult<BTreeSet<RefInfo>> {
        Ok(self.read(|s| s.get_type_refs_by_dep(module, name, version)))
    }

    fn get_type_refs_by_ref(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> StorageResult<BTreeSet<RefInfo>> {
        Ok(self.read(|s| s.get_type_refs_by_ref(module, name, version)))
    }

    fn get_func_refs_by_dep(
        &self,
        module: &str,
        name: &str,
        version: Option<&str>,
    ) -> StorageResult<BTreeSet<RefInfo>> {
        Ok(self.read(|s| s.get_func_refs_by_dep(module, name, version)))
    }

    fn get_func_refs_by_ref(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> StorageResult<BTreeSet<RefInfo>> {
        Ok(self.read(|s| s.get_func_refs_by_ref(module, name, version)))
    }

    fn get_owners_for_module(&self, module: &str) -> StorageResult<BTreeMap<String, OwnerInfo>> {
        Ok(self.read(|s| s.get_owners_for_module(module)))
    }

    fn add_owner_to_module(
        &self,
        module: &str,
        user: &str,
        with_change_owners_privilege: bool,
    ) -> StorageResult<()> {
        self.mutate(|s| {
            s.add_owner_to_module(module, user, with_change_owners_privilege);
            Ok(())
        })
    }

    fn remove_owner_from_module(&self, module: &str, user: &str) -> StorageResult<()> {
        self.mutate(|s| {
            s.remove_owner_from_module(module, user);
            Ok(())
        })
    }

    fn get_modules_for_owner(&self, user: &str) -> StorageResult<Vec<String>> {
        Ok(self.read(|s| s.get_modules_for_owner(user)))
    }

    fn add_new_module_registration_request(&self, module: &str, user: &str) -> StorageResult<()> {
        self.mutate(|s| s.add_new_module_registration_request(module, user))
    }

    fn get_new_module_registration_requests(&self) -> StorageResult<Vec<OwnerInfo>> {
        Ok(self.read(|s| s.get_new_module_registration_requests()))
    }

    fn get_owner_for_new_module_registration_request(
        &self,
        module: &str,
    ) -> StorageResult<String> {
        self.read(|s| s.get_owner_for_new_module_registration_request(module))
    }

    fn remove_new_module_registration_request(
        &self,
        module: &str,
        user: &str,
    ) -> StorageResult<()> {
        self.mutate(|s| {
            s.remove_new_module_registration_request(module, user);
            Ok(())
        })
    }
}
