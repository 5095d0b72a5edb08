//! The registry state model shared by the in-memory and file backends.
//!
//! All collections are keyed the way the Storage Port contract describes:
//! per module, per (module, versionTime), per (module, type, typeVersion),
//! plus the two ref collections. A type version counts as released when at
//! least one released module version contains it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::{StorageResult, TypeStorageError};
use super::records::{ModuleInfo, OwnerInfo, RefInfo};

/// One committed module version: info record plus spec text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct VersionRecord {
    pub released: bool,
    pub info: ModuleInfo,
    pub spec: Option<String>,
}

/// Stored schema document for one type version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SchemaRecord {
    pub document: String,
    pub md5: String,
    /// Every module version that contains this type version.
    pub module_versions: BTreeSet<u64>,
}

/// Stored parse record for one type or function version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ParseRecord {
    pub document: String,
    pub module_versions: BTreeSet<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ModuleRecord {
    pub supported: bool,
    /// High-water mark for `generate_new_version`, so concurrent saves in
    /// the same millisecond still get distinct timestamps.
    pub last_generated_version: u64,
    pub versions: BTreeMap<u64, VersionRecord>,
    pub type_schemas: BTreeMap<String, BTreeMap<String, SchemaRecord>>,
    pub type_parses: BTreeMap<String, BTreeMap<String, ParseRecord>>,
    pub func_parses: BTreeMap<String, BTreeMap<String, ParseRecord>>,
}

/// Whole-registry state; the file backend serializes this as one snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct State {
    pub modules: BTreeMap<String, ModuleRecord>,
    pub type_refs: BTreeSet<RefInfo>,
    pub func_refs: BTreeSet<RefInfo>,
    pub owners: BTreeMap<String, BTreeMap<String, OwnerInfo>>,
    pub requests: Vec<OwnerInfo>,
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

impl State {
    fn module(&self, name: &str) -> StorageResult<&ModuleRecord> {
        self.modules
            .get(name)
            .ok_or_else(|| TypeStorageError::NoSuchModuleRecord(name.to_string()))
    }

    fn module_mut(&mut self, name: &str) -> StorageResult<&mut ModuleRecord> {
        self.modules
            .get_mut(name)
            .ok_or_else(|| TypeStorageError::NoSuchModuleRecord(name.to_string()))
    }

    pub fn check_module_exists(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Create the module record plus its bootstrap version. Returns the
    /// bootstrap `versionTime`.
    pub fn init_module_info_record(&mut self, name: &str) -> StorageResult<u64> {
        if self.modules.contains_key(name) {
            return Err(TypeStorageError::ModuleAlreadyRegistered(name.to_string()));
        }
        let mut record = ModuleRecord {
            supported: true,
            ..ModuleRecord::default()
        };
        let version = now_millis().max(1);
        record.last_generated_version = version;
        let mut info = ModuleInfo::bootstrap(name);
        info.version_time = version;
        record.versions.insert(
            version,
            VersionRecord {
                released: false,
                info,
                spec: None,
            },
        );
        self.modules.insert(name.to_string(), record);
        Ok(version)
    }

    pub fn get_all_module_versions(&self, name: &str) -> StorageResult<BTreeMap<u64, bool>> {
        Ok(self
            .module(name)?
            .versions
            .iter()
            .map(|(v, r)| (*v, r.released))
            .collect())
    }

    pub fn get_last_released_module_version(&self, name: &str) -> StorageResult<u64> {
        self.module(name)?
            .versions
            .iter()
            .rev()
            .find(|(_, r)| r.released)
            .map(|(v, _)| *v)
            .ok_or_else(|| TypeStorageError::NoReleasedVersion(name.to_string()))
    }

    pub fn get_last_module_version_with_unreleased(&self, name: &str) -> StorageResult<u64> {
        self.module(name)?
            .versions
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| TypeStorageError::NoSuchModuleRecord(name.to_string()))
    }

    pub fn generate_new_module_version(&mut self, name: &str) -> StorageResult<u64> {
        let record = self.module_mut(name)?;
        let floor = record
            .versions
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
            .max(record.last_generated_version);
        let version = now_millis().max(floor + 1);
        record.last_generated_version = version;
        Ok(version)
    }

    pub fn write_module_records(
        &mut self,
        info: &ModuleInfo,
        spec: &str,
        version_time: u64,
    ) -> StorageResult<()> {
        let record = self.module_mut(&info.module_name)?;
        let mut info = info.clone();
        info.version_time = version_time;
        let released = info.released;
        record.versions.insert(
            version_time,
            VersionRecord {
                released,
                info,
                spec: Some(spec.to_string()),
            },
        );
        Ok(())
    }

    pub fn get_module_info_record(&self, name: &str, version: u64) -> StorageResult<ModuleInfo> {
        self.module(name)?
            .versions
            .get(&version)
            .map(|r| r.info.clone())
            .ok_or_else(|| TypeStorageError::NoSuchModuleVersion(name.to_string(), version))
    }

    pub fn get_module_spec_record(&self, name: &str, version: u64) -> StorageResult<String> {
        self.module(name)?
            .versions
            .get(&version)
            .and_then(|r| r.spec.clone())
            .ok_or_else(|| TypeStorageError::NoSuchModuleVersion(name.to_string(), version))
    }

    pub fn check_module_info_record_exists(&self, name: &str, version: u64) -> bool {
        self.modules
            .get(name)
            .map(|m| m.versions.contains_key(&version))
            .unwrap_or(false)
    }

    pub fn check_module_spec_record_exists(&self, name: &str, version: u64) -> bool {
        self.modules
            .get(name)
            .and_then(|m| m.versions.get(&version))
            .map(|r| r.spec.is_some())
            .unwrap_or(false)
    }

    pub fn set_module_release_version(&mut self, name: &str, version: u64) -> StorageResult<()> {
        let record = self.module_mut(name)?;
        let entry = record
            .versions
            .get_mut(&version)
            .ok_or_else(|| TypeStorageError::NoSuchModuleVersion(name.to_string(), version))?;
        entry.released = true;
        entry.info.released = true;
        Ok(())
    }

    /// Delete every record stamped with `version`. The head reverts to the
    /// previous version implicitly because versions are ordered by key.
    pub fn remove_module_version(&mut self, name: &str, version: u64) -> StorageResult<()> {
        let record = self.module_mut(name)?;
        record.versions.remove(&version);
        for per_type in record.type_schemas.values_mut() {
            per_type.retain(|_, rec| {
                rec.module_versions.remove(&version);
                !rec.module_versions.is_empty()
            });
        }
        record.type_schemas.retain(|_, m| !m.is_empty());
        for per_type in record.type_parses.values_mut() {
            per_type.retain(|_, rec| {
                rec.module_versions.remove(&version);
                !rec.module_versions.is_empty()
            });
        }
        record.type_parses.retain(|_, m| !m.is_empty());
        for per_func in record.func_parses.values_mut() {
            per_func.retain(|_, rec| {
                rec.module_versions.remove(&version);
                !rec.module_versions.is_empty()
            });
        }
        record.func_parses.retain(|_, m| !m.is_empty());
        self.type_refs
            .retain(|r| !(r.dep_module == name && r.dep_module_version == version));
        self.func_refs
            .retain(|r| !(r.dep_module == name && r.dep_module_version == version));
        Ok(())
    }

    pub fn get_module_supported_state(&self, name: &str) -> StorageResult<bool> {
        Ok(self.module(name)?.supported)
    }

    pub fn change_module_supported_state(
        &mut self,
        name: &str,
        supported: bool,
    ) -> StorageResult<()> {
        self.module_mut(name)?.supported = supported;
        Ok(())
    }

    pub fn remove_module(&mut self, name: &str) -> StorageResult<()> {
        if self.modules.remove(name).is_none() {
            return Err(TypeStorageError::NoSuchModuleRecord(name.to_string()));
        }
        self.owners.remove(name);
        self.type_refs
            .retain(|r| r.dep_module != name && r.ref_module != name);
        self.func_refs
            .retain(|r| r.dep_module != name && r.ref_module != name);
        Ok(())
    }

    pub fn get_all_registered_modules(&self, include_unsupported: bool) -> Vec<String> {
        self.modules
            .iter()
            .filter(|(_, m)| include_unsupported || m.supported)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn write_type_schema_record(
        &mut self,
        module: &str,
        type_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
        md5: &str,
    ) -> StorageResult<()> {
        let record = self.module_mut(module)?;
        let entry = record
            .type_schemas
            .entry(type_name.to_string())
            .or_default()
            .entry(version.to_string())
            .or_insert_with(|| SchemaRecord {
                document: String::new(),
                md5: String::new(),
                module_versions: BTreeSet::new(),
            });
        entry.document = document.to_string();
        entry.md5 = md5.to_string();
        entry.module_versions.insert(module_version);
        Ok(())
    }

    pub fn write_type_parse_record(
        &mut self,
        module: &str,
        type_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
    ) -> StorageResult<()> {
        let record = self.module_mut(module)?;
        let entry = record
            .type_parses
            .entry(type_name.to_string())
            .or_default()
            .entry(version.to_string())
            .or_insert_with(|| ParseRecord {
                document: String::new(),
                module_versions: BTreeSet::new(),
            });
        entry.document = document.to_string();
        entry.module_versions.insert(module_version);
        Ok(())
    }

    pub fn write_func_parse_record(
        &mut self,
        module: &str,
        func_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
    ) -> StorageResult<()> {
        let record = self.module_mut(module)?;
        let entry = record
            .func_parses
            .entry(func_name.to_string())
            .or_default()
            .entry(version.to_string())
            .or_insert_with(|| ParseRecord {
                document: String::new(),
                module_versions: BTreeSet::new(),
            });
        entry.document = document.to_string();
        entry.module_versions.insert(module_version);
        Ok(())
    }

    pub fn get_type_schema_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> Option<String> {
        self.modules
            .get(module)?
            .type_schemas
            .get(type_name)?
            .get(version)
            .map(|r| r.document.clone())
    }

    pub fn get_type_parse_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> Option<String> {
        self.modules
            .get(module)?
            .type_parses
            .get(type_name)?
            .get(version)
            .map(|r| r.document.clone())
    }

    pub fn get_func_parse_record(
        &self,
        module: &str,
        func_name: &str,
        version: &str,
    ) -> Option<String> {
        self.modules
            .get(module)?
            .func_parses
            .get(func_name)?
            .get(version)
            .map(|r| r.document.clone())
    }

    pub fn check_type_schema_record_exists(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> bool {
        self.get_type_schema_record(module, type_name, version).is_some()
    }

    fn version_released(record: &ModuleRecord, module_versions: &BTreeSet<u64>) -> bool {
        module_versions
            .iter()
            .any(|mv| record.versions.get(mv).map(|v| v.released).unwrap_or(false))
    }

    pub fn get_all_type_versions(&self, module: &str, type_name: &str) -> BTreeMap<String, bool> {
        let Some(record) = self.modules.get(module) else {
            return BTreeMap::new();
        };
        record
            .type_schemas
            .get(type_name)
            .map(|versions| {
                versions
                    .iter()
                    .map(|(ver, rec)| {
                        (
                            ver.clone(),
                            Self::version_released(record, &rec.module_versions),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_type_versions_by_md5(
        &self,
        module: &str,
        type_name: &str,
        md5: &str,
    ) -> Vec<String> {
        self.modules
            .get(module)
            .and_then(|m| m.type_schemas.get(type_name))
            .map(|versions| {
                versions
                    .iter()
                    .filter(|(_, rec)| rec.md5 == md5)
                    .map(|(ver, _)| ver.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_type_md5(&self, module: &str, type_name: &str, version: &str) -> Option<String> {
        self.modules
            .get(module)?
            .type_schemas
            .get(type_name)?
            .get(version)
            .map(|r| r.md5.clone())
    }

    pub fn get_module_versions_for_type_version(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> BTreeMap<u64, bool> {
        let Some(record) = self.modules.get(module) else {
            return BTreeMap::new();
        };
        record
            .type_schemas
            .get(type_name)
            .and_then(|versions| versions.get(version))
            .map(|rec| {
                rec.module_versions
                    .iter()
                    .map(|mv| {
                        (
                            *mv,
                            record.versions.get(mv).map(|v| v.released).unwrap_or(false),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn add_refs(&mut self, type_refs: &BTreeSet<RefInfo>, func_refs: &BTreeSet<RefInfo>) {
        self.type_refs.extend(type_refs.iter().cloned());
        self.func_refs.extend(func_refs.iter().cloned());
    }

    pub fn get_type_refs_by_dep(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> BTreeSet<RefInfo> {
        self.type_refs
            .iter()
            .filter(|r| {
                r.dep_module == module
                    && r.dep_name == name
                    && r.dep_version.as_deref() == Some(version)
            })
            .cloned()
            .collect()
    }

    pub fn get_type_refs_by_ref(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> BTreeSet<RefInfo> {
        self.type_refs
            .iter()
            .filter(|r| {
                r.ref_module == module
                    && r.ref_name == name
                    && r.ref_version.as_deref() == Some(version)
            })
            .cloned()
            .collect()
    }

    pub fn get_func_refs_by_dep(
        &self,
        module: &str,
        name: &str,
        version: Option<&str>,
    ) -> BTreeSet<RefInfo> {
        self.func_refs
            .iter()
            .filter(|r| {
                r.dep_module == module
                    && r.dep_name == name
                    && version
                        .map(|v| r.dep_version.as_deref() == Some(v))
                        .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    pub fn get_func_refs_by_ref(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> BTreeSet<RefInfo> {
        self.func_refs
            .iter()
            .filter(|r| {
                r.ref_module == module
                    && r.ref_name == name
                    && r.ref_version.as_deref() == Some(version)
            })
            .cloned()
            .collect()
    }

    pub fn get_owners_for_module(&self, module: &str) -> BTreeMap<String, OwnerInfo> {
        self.owners.get(module).cloned().unwrap_or_default()
    }

    pub fn add_owner_to_module(
        &mut self,
        module: &str,
        user: &str,
        with_change_owners_privilege: bool,
    ) {
        self.owners.entry(module.to_string()).or_default().insert(
            user.to_string(),
            OwnerInfo {
                module_name: module.to_string(),
                owner_user_id: user.to_string(),
                with_change_owners_privilege,
            },
        );
    }

    pub fn remove_owner_from_module(&mut self, module: &str, user: &str) {
        if let Some(owners) = self.owners.get_mut(module) {
            owners.remove(user);
        }
    }

    pub fn get_modules_for_owner(&self, user: &str) -> Vec<String> {
        self.owners
            .iter()
            .filter(|(_, owners)| owners.contains_key(user))
            .map(|(module, _)| module.clone())
            .collect()
    }

    pub fn add_new_module_registration_request(
        &mut self,
        module: &str,
        user: &str,
    ) -> StorageResult<()> {
        if self.modules.contains_key(module) {
            return Err(TypeStorageError::ModuleAlreadyRegistered(module.to_string()));
        }
        if self.requests.iter().any(|r| r.module_name == module) {
            return Err(TypeStorageError::DuplicateRegistrationRequest(
                module.to_string(),
            ));
        }
        self.requests.push(OwnerInfo {
            module_name: module.to_string(),
            owner_user_id: user.to_string(),
            with_change_owners_privilege: false,
        });
        Ok(())
    }

    pub fn get_new_module_registration_requests(&self) -> Vec<OwnerInfo> {
        self.requests.clone()
    }

    pub fn get_owner_for_new_module_registration_request(
        &self,
        module: &str,
    ) -> StorageResult<String> {
        self.requests
            .iter()
            .find(|r| r.module_name == module)
            .map(|r| r.owner_user_id.clone())
            .ok_or_else(|| TypeStorageError::NoSuchRegistrationRequest(module.to_string()))
    }

    pub fn remove_new_module_registration_request(&mut self, module: &str, user: &str) {
        self.requests
            .retain(|r| !(r.module_name == module && r.owner_user_id == user));
    }
}
