//! The Type Definition Database: construction, privilege checks, and all
//! read paths.
//!
//! Every public read takes the module's read lock, resolves the target
//! version after acquiring it, and serves the whole call from that one
//! snapshot. Mutations live in the sibling save/admin files.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::ast::{Funcdef, Typedef};
use crate::config::TypeDbConfig;
use crate::ident::{AbsoluteTypeDefId, Md5Hash, ModuleDefId, SemanticVersion, TypeDefId, TypeDefName};
use crate::lock::{LockManager, ReadGuard, WriteGuard};
use crate::parser::{InternalParser, ParserSource, SpecParser};
use crate::storage::{ModuleInfo, RefInfo, TypeStorage, TypeStorageError};
use crate::users::UserInfoProvider;

use super::errors::{TypeDbError, TypeDbResult};

/// The versioned type-definition database.
///
/// Thread-safe: share it behind an `Arc` and call from any thread. The
/// per-module lock manager is the only synchronization the registry itself
/// performs; storage and parser backends must tolerate concurrent calls.
pub struct TypeDefDb {
    pub(super) storage: Arc<dyn TypeStorage>,
    pub(super) users: Arc<dyn UserInfoProvider>,
    pub(super) locks: LockManager,
    pub(super) parser_source: ParserSource,
    pub(super) internal_parser: InternalParser,
    pub(super) external_parser: Option<Box<dyn SpecParser>>,
    pub(super) temp_root: PathBuf,
    pub(super) temp_suffix: Mutex<u64>,
}

impl TypeDefDb {
    /// Create a registry using the built-in parser backend.
    pub fn new(
        storage: Arc<dyn TypeStorage>,
        users: Arc<dyn UserInfoProvider>,
        config: TypeDbConfig,
    ) -> TypeDbResult<Self> {
        Self::build(storage, users, config, None)
    }

    /// Create a registry with an external parser backend available, as
    /// required by `ParserSource::External` and `ParserSource::Both`.
    pub fn with_external_parser(
        storage: Arc<dyn TypeStorage>,
        users: Arc<dyn UserInfoProvider>,
        config: TypeDbConfig,
        external_parser: Box<dyn SpecParser>,
    ) -> TypeDbResult<Self> {
        Self::build(storage, users, config, Some(external_parser))
    }

    fn build(
        storage: Arc<dyn TypeStorage>,
        users: Arc<dyn UserInfoProvider>,
        config: TypeDbConfig,
        external_parser: Option<Box<dyn SpecParser>>,
    ) -> TypeDbResult<Self> {
        if config.parser_source != ParserSource::Internal && external_parser.is_none() {
            return Err(TypeDbError::Configuration(
                "parser-source requires an external parser backend".to_string(),
            ));
        }
        let temp_root = config.temp_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        if temp_root.exists() {
            if !temp_root.is_dir() {
                return Err(TypeDbError::Configuration(format!(
                    "requested temp dir {} is not a directory",
                    temp_root.display()
                )));
            }
        } else {
            fs::create_dir_all(&temp_root)
                .map_err(|e| TypeDbError::Storage(TypeStorageError::from(e)))?;
        }
        Ok(Self {
            storage,
            users,
            locks: LockManager::new(config.max_deadlock_wait()),
            parser_source: config.parser_source,
            internal_parser: InternalParser::new(),
            external_parser,
            temp_root,
            temp_suffix: Mutex::new(Utc::now().timestamp_millis().max(0) as u64),
        })
    }

    // --- locking ---

    /// Read lock for a module that must already exist.
    pub(super) fn read_lock(&self, module: &str) -> TypeDbResult<ReadGuard<'_>> {
        if !self.storage.check_module_exists(module)? {
            return Err(TypeDbError::NoSuchModule(module.to_string()));
        }
        Ok(self.locks.read(module)?)
    }

    /// Read lock that tolerates an unregistered module name (used while a
    /// registration request is being queued).
    pub(super) fn read_lock_any(&self, module: &str) -> TypeDbResult<ReadGuard<'_>> {
        Ok(self.locks.read(module)?)
    }

    pub(super) fn write_lock(&self, module: &str) -> TypeDbResult<WriteGuard<'_>> {
        Ok(self.locks.write(module)?)
    }

    // --- privilege checks ---

    pub(super) fn check_admin(&self, user_id: &str) -> TypeDbResult<()> {
        if !self.users.is_admin(user_id) {
            return Err(TypeDbError::NoSuchPrivilege(format!(
                "user {user_id} should be administrator"
            )));
        }
        Ok(())
    }

    /// Owner-or-admin gate. Returns whether the caller may also change the
    /// owner list.
    pub(super) fn check_user_is_owner_or_admin(
        &self,
        module: &str,
        user_id: &str,
    ) -> TypeDbResult<bool> {
        if self.users.is_admin(user_id) {
            return Ok(true);
        }
        let owners = self.storage.get_owners_for_module(module)?;
        match owners.get(user_id) {
            None => Err(TypeDbError::NoSuchPrivilege(format!(
                "user {user_id} is not in the list of owners of module {module}"
            ))),
            Some(owner) => Ok(owner.with_change_owners_privilege),
        }
    }

    pub(super) fn check_user_can_change_privileges(
        &self,
        user_id: &str,
        module: &str,
    ) -> TypeDbResult<()> {
        if !self.check_user_is_owner_or_admin(module, user_id)? {
            return Err(TypeDbError::NoSuchPrivilege(format!(
                "user {user_id} can not change privileges for module {module}"
            )));
        }
        Ok(())
    }

    // --- module state checks ---

    pub(super) fn is_module_supported(&self, module: &str) -> TypeDbResult<bool> {
        Ok(self.storage.get_module_supported_state(module)?)
    }

    pub(super) fn check_module_supported(&self, module: &str) -> TypeDbResult<()> {
        if !self.is_module_supported(module)? {
            return Err(TypeDbError::NoSuchModule(module.to_string()));
        }
        Ok(())
    }

    /// A module counts as registered once its bootstrap record exists at
    /// the last released version.
    pub(super) fn check_module_registered(&self, module: &str) -> TypeDbResult<()> {
        if !self.storage.check_module_exists(module)? {
            return Err(TypeDbError::NoSuchModule(module.to_string()));
        }
        let last_released = self.storage.get_last_released_module_version(module)?;
        if !self
            .storage
            .check_module_info_record_exists(module, last_released)?
        {
            return Err(TypeDbError::NoSuchModule(module.to_string()));
        }
        Ok(())
    }

    fn is_valid_module_unlocked(&self, module: &str, version: Option<u64>) -> TypeDbResult<bool> {
        if !self.storage.check_module_exists(module)? {
            return Ok(false);
        }
        let version = match version {
            Some(v) => v,
            None => {
                if !self.is_module_supported(module)? {
                    return Ok(false);
                }
                self.storage.get_last_released_module_version(module)?
            }
        };
        Ok(self.storage.check_module_info_record_exists(module, version)?
            && self.storage.check_module_spec_record_exists(module, version)?)
    }

    /// Module must have an uploaded spec at the given (or latest released)
    /// version.
    pub(super) fn check_module(&self, module: &str, version: Option<u64>) -> TypeDbResult<()> {
        if !self.is_valid_module_unlocked(module, version)? {
            return Err(TypeDbError::NoSuchModule(module.to_string()));
        }
        Ok(())
    }

    /// True when the module has been registered and a spec uploaded.
    pub fn is_valid_module(&self, module: &str) -> TypeDbResult<bool> {
        let _guard = match self.read_lock(module) {
            Ok(guard) => guard,
            Err(TypeDbError::NoSuchModule(_)) => return Ok(false),
            Err(err) => return Err(err),
        };
        self.is_valid_module_unlocked(module, None)
    }

    // --- version resolution ---

    pub(super) fn parse_stored_version(text: &str) -> TypeDbResult<SemanticVersion> {
        text.parse().map_err(|_| {
            TypeDbError::Storage(TypeStorageError::Encoding(format!(
                "stored version is not <major>.<minor>: {text}"
            )))
        })
    }

    pub(super) fn find_module_version(&self, id: &ModuleDefId) -> TypeDbResult<u64> {
        match id.version {
            None => {
                self.check_module_supported(&id.module_name)?;
                Ok(self
                    .storage
                    .get_last_released_module_version(&id.module_name)?)
            }
            Some(version) => {
                if !self
                    .storage
                    .check_module_info_record_exists(&id.module_name, version)?
                {
                    return Err(TypeDbError::NoSuchModule(id.to_string()));
                }
                Ok(version)
            }
        }
    }

    pub(super) fn get_module_info_unlocked(
        &self,
        module: &str,
        version: u64,
    ) -> TypeDbResult<ModuleInfo> {
        self.check_module_registered(module)?;
        Ok(self.storage.get_module_info_record(module, version)?)
    }

    /// Latest released info of a supported module.
    pub(super) fn get_module_info_unlocked_latest(&self, module: &str) -> TypeDbResult<ModuleInfo> {
        self.check_module_supported(module)?;
        let version = self.storage.get_last_released_module_version(module)?;
        self.get_module_info_unlocked(module, version)
    }

    pub(super) fn last_type_version_in_info(
        info: &ModuleInfo,
        type_name: &str,
        with_unsupported: bool,
    ) -> TypeDbResult<Option<SemanticVersion>> {
        match info.types.get(type_name) {
            Some(ti) if (ti.supported || with_unsupported) && !ti.type_version.is_empty() => {
                Ok(Some(Self::parse_stored_version(&ti.type_version)?))
            }
            _ => Ok(None),
        }
    }

    pub(super) fn last_func_version_in_info(
        info: &ModuleInfo,
        func_name: &str,
        with_unsupported: bool,
    ) -> TypeDbResult<Option<SemanticVersion>> {
        match info.funcs.get(func_name) {
            Some(fi) if (fi.supported || with_unsupported) && !fi.func_version.is_empty() => {
                Ok(Some(Self::parse_stored_version(&fi.func_version)?))
            }
            _ => Ok(None),
        }
    }

    fn find_last_type_version(
        &self,
        module: &str,
        type_name: &str,
        with_unsupported: bool,
    ) -> TypeDbResult<Option<SemanticVersion>> {
        let info = match self.get_module_info_unlocked_latest(module) {
            Ok(info) => info,
            Err(TypeDbError::NoSuchModule(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        Self::last_type_version_in_info(&info, type_name, with_unsupported)
    }

    pub(super) fn find_last_func_version(
        &self,
        module: &str,
        func_name: &str,
    ) -> TypeDbResult<Option<SemanticVersion>> {
        let info = match self.get_module_info_unlocked_latest(module) {
            Ok(info) => info,
            Err(TypeDbError::NoSuchModule(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        Self::last_func_version_in_info(&info, func_name, false)
    }

    /// Resolve an id to a concrete stored version, per the selector rules:
    /// MD5 → highest matching version; exact pin → that version; major
    /// only → highest released version of that major line; no selector →
    /// latest supported version in the latest released module version.
    pub(super) fn find_type_version(
        &self,
        id: &TypeDefId,
    ) -> TypeDbResult<Option<SemanticVersion>> {
        if let Some(md5) = &id.md5 {
            let mut ret: Option<SemanticVersion> = None;
            for text in
                self.storage
                    .get_type_versions_by_md5(&id.name.module, &id.name.name, md5.as_hex())?
            {
                let version = Self::parse_stored_version(&text)?;
                if ret.map_or(true, |best| best < version) {
                    ret = Some(version);
                }
            }
            return Ok(ret);
        }
        if let Some(version) = id.version() {
            return Ok(Some(version));
        }
        if !self.is_module_supported(&id.name.module)? {
            return Ok(None);
        }
        if let Some(major) = id.major {
            let versions = self
                .storage
                .get_all_type_versions(&id.name.module, &id.name.name)?;
            let mut ret: Option<SemanticVersion> = None;
            for (text, released) in versions {
                if !released {
                    continue;
                }
                let version = Self::parse_stored_version(&text)?;
                if version.major == major && ret.map_or(true, |best| best < version) {
                    ret = Some(version);
                }
            }
            return Ok(ret);
        }
        self.find_last_type_version(&id.name.module, &id.name.name, false)
    }

    pub(super) fn no_such_type(id: &TypeDefId) -> TypeDbError {
        TypeDbError::NoSuchType(id.to_string())
    }

    pub(super) fn resolve_type_def_id_unlocked(
        &self,
        id: &TypeDefId,
    ) -> TypeDbResult<AbsoluteTypeDefId> {
        self.check_module_registered(&id.name.module)?;
        let version = self
            .find_type_version(id)?
            .ok_or_else(|| Self::no_such_type(id))?;
        if self
            .storage
            .get_type_schema_record(&id.name.module, &id.name.name, &version.to_string())?
            .is_none()
        {
            return Err(TypeDbError::NoSuchType(format!(
                "unable to read type schema record: {}",
                id.name
            )));
        }
        Ok(AbsoluteTypeDefId::new(id.name.clone(), version))
    }

    /// Resolve an id (possibly partial, possibly by MD5) to the absolute
    /// type version it denotes.
    pub fn resolve_type_def_id(&self, id: &TypeDefId) -> TypeDbResult<AbsoluteTypeDefId> {
        let _guard = self.read_lock(&id.name.module)?;
        self.resolve_type_def_id_unlocked(id)
    }

    /// True when the id resolves to a stored schema record.
    pub fn is_valid_type(&self, id: &TypeDefId) -> TypeDbResult<bool> {
        let _guard = match self.read_lock(&id.name.module) {
            Ok(guard) => guard,
            Err(TypeDbError::NoSuchModule(_)) => return Ok(false),
            Err(err) => return Err(err),
        };
        if !self.storage.check_module_exists(&id.name.module)? {
            return Ok(false);
        }
        let last_released = self.storage.get_last_released_module_version(&id.name.module)?;
        if !self
            .storage
            .check_module_info_record_exists(&id.name.module, last_released)?
        {
            return Ok(false);
        }
        match self.find_type_version(id)? {
            None => Ok(false),
            Some(version) => Ok(self.storage.check_type_schema_record_exists(
                &id.name.module,
                &id.name.name,
                &version.to_string(),
            )?),
        }
    }

    // --- schema documents ---

    fn get_json_schema_document_unlocked(&self, id: &TypeDefId) -> TypeDbResult<String> {
        let abs = self.resolve_type_def_id_unlocked(id)?;
        self.storage
            .get_type_schema_record(&abs.name.module, &abs.name.name, &abs.version.to_string())?
            .ok_or_else(|| {
                TypeDbError::NoSuchType(format!("unable to read type schema record: {}", abs.name))
            })
    }

    /// The stored JSON-Schema document for the resolved type version.
    pub fn get_json_schema_document(&self, id: &TypeDefId) -> TypeDbResult<String> {
        let _guard = self.read_lock(&id.name.module)?;
        self.get_json_schema_document_unlocked(id)
    }

    /// The stored schema document parsed into a JSON value, failing when
    /// the document is not a JSON object.
    pub fn get_json_schema(&self, id: &TypeDefId) -> TypeDbResult<serde_json::Value> {
        let _guard = self.read_lock(&id.name.module)?;
        let document = self.get_json_schema_document_unlocked(id)?;
        Self::parse_json_schema(&document, &id.to_string())
    }

    pub(super) fn parse_json_schema(document: &str, what: &str) -> TypeDbResult<serde_json::Value> {
        match serde_json::from_str::<serde_json::Value>(document) {
            Ok(value @ serde_json::Value::Object(_)) => Ok(value),
            _ => Err(TypeDbError::BadJsonSchemaDocument(what.to_string())),
        }
    }

    /// Schema documents for every type of the referenced module version.
    pub fn get_json_schemas_for_all_types(
        &self,
        id: &ModuleDefId,
    ) -> TypeDbResult<BTreeMap<AbsoluteTypeDefId, String>> {
        let _guard = self.read_lock(&id.module_name)?;
        let version = self.find_module_version(id)?;
        let info = self.storage.get_module_info_record(&id.module_name, version)?;
        let mut ret = BTreeMap::new();
        for ti in info.types.values() {
            let document = self
                .storage
                .get_type_schema_record(&id.module_name, &ti.type_name, &ti.type_version)?
                .ok_or_else(|| {
                    TypeDbError::NoSuchType(format!(
                        "unable to read type schema record: {}.{}",
                        id.module_name, ti.type_name
                    ))
                })?;
            let type_version = Self::parse_stored_version(&ti.type_version)?;
            ret.insert(
                AbsoluteTypeDefId::new(
                    TypeDefName::new(id.module_name.clone(), ti.type_name.clone()),
                    type_version,
                ),
                document,
            );
        }
        Ok(ret)
    }

    // --- MD5 lookups ---

    /// The schema-document digest of the resolved type version.
    pub fn get_type_md5_version(&self, id: &TypeDefId) -> TypeDbResult<Md5Hash> {
        let _guard = self.read_lock(&id.name.module)?;
        let version = self
            .find_type_version(id)?
            .ok_or_else(|| Self::no_such_type(id))?;
        let md5 = self
            .storage
            .get_type_md5(&id.name.module, &id.name.name, &version.to_string())?
            .ok_or_else(|| Self::no_such_type(id))?;
        md5.parse().map_err(|_| {
            TypeDbError::Storage(TypeStorageError::Encoding(format!(
                "stored digest is not an MD5: {md5}"
            )))
        })
    }

    /// Every stored version whose schema document has the id's digest.
    pub fn get_type_versions_for_md5(
        &self,
        id: &TypeDefId,
    ) -> TypeDbResult<Vec<AbsoluteTypeDefId>> {
        let md5 = id
            .md5
            .as_ref()
            .ok_or_else(|| TypeDbError::NoSuchType(format!("MD5 part is not defined for type {id}")))?;
        let _guard = self.read_lock(&id.name.module)?;
        let versions =
            self.storage
                .get_type_versions_by_md5(&id.name.module, &id.name.name, md5.as_hex())?;
        let mut ret = Vec::new();
        for text in versions {
            ret.push(AbsoluteTypeDefId::new(
                id.name.clone(),
                Self::parse_stored_version(&text)?,
            ));
        }
        Ok(ret)
    }

    // --- parsing documents ---

    pub(super) fn load_type_parse(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> TypeDbResult<Typedef> {
        let document = self
            .storage
            .get_type_parse_record(module, type_name, version)?
            .ok_or_else(|| {
                TypeDbError::NoSuchType(format!(
                    "unable to read type parse record: {module}.{type_name}"
                ))
            })?;
        Typedef::from_canonical_json(&document)
            .map_err(|e| TypeDbError::Storage(TypeStorageError::Encoding(e.to_string())))
    }

    pub(super) fn load_func_parse(
        &self,
        module: &str,
        func_name: &str,
        version: &str,
    ) -> TypeDbResult<Funcdef> {
        let document = self
            .storage
            .get_func_parse_record(module, func_name, version)?
            .ok_or_else(|| {
                TypeDbError::NoSuchFunc(format!(
                    "unable to read function parse record: {module}.{func_name}"
                ))
            })?;
        Funcdef::from_canonical_json(&document)
            .map_err(|e| TypeDbError::Storage(TypeStorageError::Encoding(e.to_string())))
    }

    pub(super) fn get_type_parsing_document_unlocked(
        &self,
        id: &TypeDefId,
    ) -> TypeDbResult<Typedef> {
        self.check_module_registered(&id.name.module)?;
        let version = self
            .find_type_version(id)?
            .ok_or_else(|| Self::no_such_type(id))?;
        self.load_type_parse(&id.name.module, &id.name.name, &version.to_string())
    }

    /// The stored AST of the resolved type version.
    pub fn get_type_parsing_document(&self, id: &TypeDefId) -> TypeDbResult<Typedef> {
        let _guard = self.read_lock(&id.name.module)?;
        self.get_type_parsing_document_unlocked(id)
    }

    pub(super) fn get_func_parsing_document_unlocked(
        &self,
        module: &str,
        func_name: &str,
        version: Option<&str>,
    ) -> TypeDbResult<Funcdef> {
        self.check_module_registered(module)?;
        let version = match version {
            Some(text) => Self::parse_stored_version(text)?,
            None => self
                .find_last_func_version(module, func_name)?
                .ok_or_else(|| {
                    TypeDbError::NoSuchFunc(format!("unable to locate function: {module}.{func_name}"))
                })?,
        };
        self.load_func_parse(module, func_name, &version.to_string())
    }

    /// The stored AST of a function, at the given version or the latest.
    pub fn get_func_parsing_document(
        &self,
        module: &str,
        func_name: &str,
        version: Option<&str>,
    ) -> TypeDbResult<Funcdef> {
        let _guard = self.read_lock(module)?;
        self.get_func_parsing_document_unlocked(module, func_name, version)
    }

    // --- listings and latest versions ---

    /// Latest version of a type in the latest released module version.
    pub fn get_latest_type_version(&self, type_name: &TypeDefName) -> TypeDbResult<SemanticVersion> {
        let _guard = self.read_lock(&type_name.module)?;
        self.check_module(&type_name.module, None)?;
        self.find_last_type_version(&type_name.module, &type_name.name, false)?
            .ok_or_else(|| TypeDbError::NoSuchType(format!("unable to locate type: {type_name}")))
    }

    /// Latest version of a function in the latest released module version.
    pub fn get_latest_func_version(
        &self,
        module: &str,
        func_name: &str,
    ) -> TypeDbResult<SemanticVersion> {
        let _guard = self.read_lock(module)?;
        self.check_module(module, None)?;
        self.find_last_func_version(module, func_name)?
            .ok_or_else(|| {
                TypeDbError::NoSuchFunc(format!("unable to locate function: {module}.{func_name}"))
            })
    }

    /// Names of the supported types of the referenced module version.
    pub fn get_all_registered_types(&self, id: &ModuleDefId) -> TypeDbResult<Vec<String>> {
        let _guard = self.read_lock(&id.module_name)?;
        let version = self.find_module_version(id)?;
        let info = self.get_module_info_unlocked(&id.module_name, version)?;
        Ok(info
            .types
            .values()
            .filter(|ti| ti.supported)
            .map(|ti| ti.type_name.clone())
            .collect())
    }

    /// Names of the supported functions of the latest released module
    /// version.
    pub fn get_all_registered_funcs(&self, module: &str) -> TypeDbResult<Vec<String>> {
        let _guard = self.read_lock(module)?;
        let info = self.get_module_info_unlocked_latest(module)?;
        Ok(info
            .funcs
            .values()
            .filter(|fi| fi.supported)
            .map(|fi| fi.func_name.clone())
            .collect())
    }

    // --- module info and spec documents ---

    /// Info record of the referenced module version.
    pub fn get_module_info(&self, id: &ModuleDefId) -> TypeDbResult<ModuleInfo> {
        let _guard = self.read_lock(&id.module_name)?;
        let version = self.find_module_version(id)?;
        self.get_module_info_unlocked(&id.module_name, version)
    }

    /// Spec source text of the referenced module version.
    pub fn get_module_spec_document(&self, id: &ModuleDefId) -> TypeDbResult<String> {
        let _guard = self.read_lock(&id.module_name)?;
        self.check_module_registered(&id.module_name)?;
        let version = self.find_module_version(id)?;
        self.check_module(&id.module_name, Some(version))?;
        Ok(self.storage.get_module_spec_record(&id.module_name, version)?)
    }

    pub fn get_module_description(&self, id: &ModuleDefId) -> TypeDbResult<String> {
        Ok(self.get_module_info(id)?.description)
    }

    pub fn get_type_description(&self, id: &TypeDefId) -> TypeDbResult<String> {
        Ok(self.get_type_parsing_document(id)?.comment)
    }

    pub fn get_func_description(
        &self,
        module: &str,
        func_name: &str,
        version: Option<&str>,
    ) -> TypeDbResult<String> {
        Ok(self.get_func_parsing_document(module, func_name, version)?.comment)
    }

    /// Canonical AST digest of the referenced module version; absent for
    /// the bootstrap record.
    pub fn get_module_md5(&self, id: &ModuleDefId) -> TypeDbResult<Option<Md5Hash>> {
        Ok(self.get_module_info(id)?.md5_hash)
    }

    /// All committed versions whose canonical AST digest matches.
    pub fn find_module_versions_by_md5(
        &self,
        module: &str,
        md5: &Md5Hash,
    ) -> TypeDbResult<Vec<ModuleDefId>> {
        let _guard = self.read_lock(module)?;
        let mut ret = Vec::new();
        for version in self.all_module_versions_unlocked(module, false)? {
            let info = self.get_module_info_unlocked(module, version)?;
            if info.md5_hash.as_ref() == Some(md5) {
                ret.push(ModuleDefId::at_version(module, version));
            }
        }
        Ok(ret)
    }

    /// Module versions containing the resolved type version. Unreleased
    /// module versions are listed only for an absolute query that no
    /// released module version satisfies.
    pub fn find_module_versions_by_type_version(
        &self,
        id: &TypeDefId,
    ) -> TypeDbResult<Vec<ModuleDefId>> {
        let _guard = self.read_lock(&id.name.module)?;
        let mut with_unreleased = id.is_absolute();
        let abs = self.resolve_type_def_id_unlocked(id)?;
        let module_versions = self.storage.get_module_versions_for_type_version(
            &abs.name.module,
            &abs.name.name,
            &abs.version.to_string(),
        )?;
        if with_unreleased && module_versions.values().any(|released| *released) {
            with_unreleased = false;
        }
        Ok(module_versions
            .into_iter()
            .filter(|(_, released)| with_unreleased || *released)
            .map(|(version, _)| ModuleDefId::at_version(abs.name.module.clone(), version))
            .collect())
    }

    // --- module version listings ---

    /// Latest released version of a supported module.
    pub fn get_latest_module_version(&self, module: &str) -> TypeDbResult<u64> {
        let _guard = self.read_lock(module)?;
        self.check_module_registered(module)?;
        self.check_module_supported(module)?;
        Ok(self.storage.get_last_released_module_version(module)?)
    }

    /// Latest committed version, released or not. Owner-gated.
    pub fn get_latest_module_version_with_unreleased(
        &self,
        module: &str,
        user_id: &str,
    ) -> TypeDbResult<u64> {
        self.check_user_is_owner_or_admin(module, user_id)?;
        let _guard = self.read_lock(module)?;
        self.check_module_registered(module)?;
        Ok(self.storage.get_last_module_version_with_unreleased(module)?)
    }

    fn all_module_versions_unlocked(
        &self,
        module: &str,
        with_unreleased: bool,
    ) -> TypeDbResult<Vec<u64>> {
        let versions = self.storage.get_all_module_versions(module)?;
        let bootstrap = versions.keys().next().copied();
        Ok(versions
            .iter()
            .filter(|(version, released)| {
                Some(**version) != bootstrap && (with_unreleased || **released)
            })
            .map(|(version, _)| *version)
            .collect())
    }

    /// Released versions of a module, oldest first. The bootstrap record
    /// is not listed.
    pub fn get_all_module_versions(&self, module: &str) -> TypeDbResult<Vec<u64>> {
        let _guard = self.read_lock(module)?;
        self.check_module_registered(module)?;
        self.check_module_supported(module)?;
        self.all_module_versions_unlocked(module, false)
    }

    /// All committed versions including unreleased ones. Owner-gated.
    pub fn get_all_module_versions_with_unreleased(
        &self,
        module: &str,
        user_id: &str,
    ) -> TypeDbResult<Vec<u64>> {
        let _guard = self.read_lock(module)?;
        self.check_module_registered(module)?;
        self.check_module_supported(module)?;
        self.check_user_is_owner_or_admin(module, user_id)?;
        self.all_module_versions_unlocked(module, true)
    }

    /// Names of all supported modules.
    pub fn get_all_registered_modules(&self) -> TypeDbResult<Vec<String>> {
        Ok(self.storage.get_all_registered_modules(false)?)
    }

    // --- refs ---

    fn get_type_version_text(&self, id: &TypeDefId) -> TypeDbResult<String> {
        self.check_module_registered(&id.name.module)?;
        let version = self
            .find_type_version(id)?
            .ok_or_else(|| Self::no_such_type(id))?;
        Ok(version.to_string())
    }

    /// Refs recorded for the resolved type version (what it depends on).
    pub fn get_type_refs_by_dep(&self, id: &TypeDefId) -> TypeDbResult<BTreeSet<RefInfo>> {
        let _guard = self.read_lock(&id.name.module)?;
        let version = self.get_type_version_text(id)?;
        Ok(self
            .storage
            .get_type_refs_by_dep(&id.name.module, &id.name.name, &version)?)
    }

    /// Refs pointing at the resolved type version (what depends on it).
    pub fn get_type_refs_by_ref(&self, id: &TypeDefId) -> TypeDbResult<BTreeSet<RefInfo>> {
        let _guard = self.read_lock(&id.name.module)?;
        let version = self.get_type_version_text(id)?;
        Ok(self
            .storage
            .get_type_refs_by_ref(&id.name.module, &id.name.name, &version)?)
    }

    /// Refs recorded for a function version (what it depends on).
    pub fn get_func_refs_by_dep(
        &self,
        module: &str,
        func_name: &str,
        version: Option<&str>,
    ) -> TypeDbResult<BTreeSet<RefInfo>> {
        let _guard = self.read_lock(module)?;
        self.check_module_registered(module)?;
        let version = match version {
            Some(text) => text.to_string(),
            None => self
                .find_last_func_version(module, func_name)?
                .ok_or_else(|| {
                    TypeDbError::NoSuchFunc(format!("unable to locate function: {module}.{func_name}"))
                })?
                .to_string(),
        };
        Ok(self
            .storage
            .get_func_refs_by_dep(module, func_name, Some(&version))?)
    }

    /// Function refs pointing at the resolved type version.
    pub fn get_func_refs_by_ref(&self, id: &TypeDefId) -> TypeDbResult<BTreeSet<RefInfo>> {
        let _guard = self.read_lock(&id.name.module)?;
        let version = self.get_type_version_text(id)?;
        Ok(self
            .storage
            .get_func_refs_by_ref(&id.name.module, &id.name.name, &version)?)
    }
}
