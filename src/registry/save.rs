//! The save-module pipeline, module release, and transaction rollback.
//!
//! A save compiles the submitted spec against its include closure, diffs
//! every component against the stored parse records, assigns next versions,
//! and commits all records under one fresh `versionTime`. Any failure
//! inside the commit deletes everything stamped with that `versionTime`
//! and reverts the module head.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::ast::{Component, Funcdef, Module, Type, Typedef};
use crate::compat::{self, Change};
use crate::ident::{AbsoluteTypeDefId, Md5Hash, ModuleDefId, SemanticVersion, TypeDefName};
use crate::parser::{compile_dual, include, ParserSource, SpecParser, SpecParseError};
use crate::storage::{FuncInfo, ModuleInfo, RefInfo, TypeInfo, TypeStorageError};

use super::db::TypeDefDb;
use super::errors::{TypeDbError, TypeDbResult};

/// Caller options for a module save.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Types newly registered by this save. Each must appear as a typedef
    /// in the spec and must not be registered yet.
    pub added_types: BTreeSet<String>,
    /// Types explicitly unregistered by this save.
    pub unregistered_types: BTreeSet<String>,
    /// Run the whole pipeline but skip the commit.
    pub dry_run: bool,
    /// Pin included modules to specific committed versions.
    pub module_version_restrictions: BTreeMap<String, u64>,
    /// Optimistic-concurrency check against the module's latest committed
    /// version.
    pub expected_previous_version: Option<u64>,
    pub upload_comment: String,
}

/// Outcome for one type touched by a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeChange {
    pub unregistered: bool,
    /// Version assigned to the type; absent for unregistrations.
    pub new_type_version: Option<AbsoluteTypeDefId>,
    /// Generated schema document; absent for unregistrations.
    pub json_schema_document: Option<String>,
}

/// One pending write of the commit phase.
enum ComponentChange {
    SaveType {
        name: String,
        json_schema: String,
        parsing: Typedef,
        not_backward_compatible: bool,
        dependencies: BTreeSet<RefInfo>,
    },
    DeleteType {
        name: String,
    },
    SaveFunc {
        name: String,
        parsing: Funcdef,
        not_backward_compatible: bool,
        dependencies: BTreeSet<RefInfo>,
    },
    DeleteFunc {
        name: String,
    },
}

struct CompiledSpec {
    module: Module,
    schemas: BTreeMap<String, BTreeMap<String, String>>,
    dep_infos: BTreeMap<String, ModuleInfo>,
}

/// Scratch directory for out-of-process parsing; removed on drop.
struct TempWorkDir {
    path: PathBuf,
}

impl TempWorkDir {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempWorkDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

impl TypeDefDb {
    /// Register a new spec document for its module.
    pub fn register_module(
        &self,
        spec_document: &str,
        options: SaveOptions,
        user_id: &str,
    ) -> TypeDbResult<BTreeMap<TypeDefName, TypeChange>> {
        self.save_module(spec_document, options, user_id, "registerModule")
    }

    /// Re-save a module from its stored spec document, typically after a
    /// dependency released new versions.
    pub fn refresh_module(
        &self,
        module: &str,
        options: SaveOptions,
        user_id: &str,
    ) -> TypeDbResult<BTreeMap<TypeDefName, TypeChange>> {
        let spec = {
            let _guard = self.read_lock(module)?;
            let version = self.storage.get_last_module_version_with_unreleased(module)?;
            self.check_module(module, Some(version))?;
            self.storage.get_module_spec_record(module, version)?
        };
        self.save_module(&spec, options, user_id, "refreshModule")
    }

    /// Unregister a single type by re-saving the current spec with the
    /// type in the unregistered set.
    pub fn stop_type_support(
        &self,
        type_name: &TypeDefName,
        user_id: &str,
        upload_comment: &str,
    ) -> TypeDbResult<BTreeMap<TypeDefName, TypeChange>> {
        let spec = self.get_module_spec_document(&ModuleDefId::latest(type_name.module.clone()))?;
        let options = SaveOptions {
            unregistered_types: BTreeSet::from([type_name.name.clone()]),
            upload_comment: upload_comment.to_string(),
            ..SaveOptions::default()
        };
        self.save_module(&spec, options, user_id, "stopTypeSupport")
    }

    fn save_module(
        &self,
        spec_document: &str,
        options: SaveOptions,
        user_id: &str,
        upload_method: &str,
    ) -> TypeDbResult<BTreeMap<TypeDefName, TypeChange>> {
        let SaveOptions {
            added_types,
            mut unregistered_types,
            dry_run,
            module_version_restrictions,
            expected_previous_version,
            upload_comment,
        } = options;
        let (spec_document, included_modules) = include::rewrite_includes(spec_document)?;
        let CompiledSpec {
            module,
            schemas,
            dep_infos,
        } = self.compile_spec(&spec_document, &included_modules, &module_version_restrictions)?;
        let module_name = module.name.clone();
        self.check_module_registered(&module_name)?;
        self.check_module_supported(&module_name)?;
        self.check_user_is_owner_or_admin(&module_name, user_id)?;
        let real_prev_version = self
            .storage
            .get_last_module_version_with_unreleased(&module_name)?;
        if let Some(expected) = expected_previous_version {
            if real_prev_version != expected {
                return Err(SpecParseError::ConcurrentModification {
                    actual: real_prev_version,
                    expected,
                }
                .into());
            }
        }
        let _write = self.write_lock(&module_name)?;

        let mut info = self.get_module_info_unlocked(&module_name, real_prev_version)?;
        let is_new = !self
            .storage
            .check_module_spec_record_exists(&module_name, info.version_time)?;
        let prev_md5 = info.md5_hash.clone();
        info.md5_hash = Some(
            module
                .canonical_md5()
                .map_err(|e| SpecParseError::Internal(e.to_string()))?,
        );
        info.description = module.comment.clone();
        let prev_includes = info.included_module_name_to_version.clone();
        let mut new_includes = BTreeMap::new();
        for dep in &included_modules {
            let dep_info = dep_infos
                .get(dep)
                .ok_or_else(|| SpecParseError::MissingInclude(dep.clone()))?;
            new_includes.insert(dep.clone(), dep_info.version_time);
        }
        info.included_module_name_to_version = new_includes;
        info.upload_user_id = Some(user_id.to_string());
        info.upload_method = Some(upload_method.to_string());
        info.upload_comment = upload_comment;
        info.released = false;

        let type_to_schema = schemas
            .get(&module_name)
            .ok_or_else(|| SpecParseError::SchemaGenerationMissing(module_name.clone()))?;

        let mut old_registered_types: BTreeSet<String> = BTreeSet::new();
        let mut old_registered_funcs: BTreeSet<String> = BTreeSet::new();
        if !is_new {
            for ti in info.types.values().filter(|ti| ti.supported) {
                old_registered_types.insert(ti.type_name.clone());
            }
            for fi in info.funcs.values().filter(|fi| fi.supported) {
                old_registered_funcs.insert(fi.func_name.clone());
            }
        }
        for type_name in &unregistered_types {
            if !old_registered_types.contains(type_name) {
                return Err(SpecParseError::TypeNotRegistered(type_name.clone()).into());
            }
        }
        for type_name in &added_types {
            if old_registered_types.contains(type_name) {
                return Err(SpecParseError::TypeAlreadyRegistered(type_name.clone()).into());
            }
            if unregistered_types.contains(type_name) {
                return Err(SpecParseError::TypeInBothLists(type_name.clone()).into());
            }
        }
        let mut new_registered_types = old_registered_types.clone();
        for type_name in &unregistered_types {
            new_registered_types.remove(type_name);
        }
        new_registered_types.extend(added_types.iter().cloned());

        let mut all_new_types: BTreeSet<String> = BTreeSet::new();
        let mut all_new_funcs: BTreeSet<String> = BTreeSet::new();
        let mut comps: Vec<ComponentChange> = Vec::new();
        let mut ret: BTreeMap<TypeDefName, TypeChange> = BTreeMap::new();
        for component in &module.components {
            match component {
                Component::Typedef(typedef) => {
                    all_new_types.insert(typedef.name.clone());
                    if !new_registered_types.contains(&typedef.name) {
                        continue;
                    }
                    let json_schema = type_to_schema
                        .get(&typedef.name)
                        .ok_or_else(|| SpecParseError::SchemaMissingForType(typedef.name.clone()))?;
                    let mut change = self.find_type_change(&info, typedef)?;
                    if change == Change::NoChange {
                        let current_version = info
                            .types
                            .get(&typedef.name)
                            .map(|ti| ti.type_version.clone())
                            .ok_or_else(|| {
                                SpecParseError::Internal(format!(
                                    "unchanged type has no registration record: {}",
                                    typedef.name
                                ))
                            })?;
                        let prev_schema = self.storage.get_type_schema_record(
                            &module_name,
                            &typedef.name,
                            &current_version,
                        )?;
                        if prev_schema.as_deref() == Some(json_schema.as_str()) {
                            continue;
                        }
                        change = Change::BackwardCompatible;
                    }
                    let dependencies =
                        extract_typedef_refs(typedef, &dep_infos, &new_registered_types)?;
                    Self::parse_json_schema(json_schema, &typedef.name)?;
                    let not_backward_compatible = change == Change::NotCompatible;
                    let new_version = compat::next_version(
                        Self::last_type_version_in_info(&info, &typedef.name, true)?,
                        not_backward_compatible,
                    );
                    let type_def_name = TypeDefName::new(module_name.clone(), typedef.name.clone());
                    ret.insert(
                        type_def_name.clone(),
                        TypeChange {
                            unregistered: false,
                            new_type_version: Some(AbsoluteTypeDefId::new(
                                type_def_name,
                                new_version,
                            )),
                            json_schema_document: Some(json_schema.clone()),
                        },
                    );
                    comps.push(ComponentChange::SaveType {
                        name: typedef.name.clone(),
                        json_schema: json_schema.clone(),
                        parsing: typedef.clone(),
                        not_backward_compatible,
                        dependencies,
                    });
                }
                Component::Funcdef(funcdef) => {
                    all_new_funcs.insert(funcdef.name.clone());
                    let change = self.find_func_change(&info, funcdef)?;
                    if change == Change::NoChange {
                        continue;
                    }
                    let mut dependencies = BTreeSet::new();
                    for param in funcdef.parameters.iter().chain(&funcdef.returns) {
                        collect_type_refs(
                            &mut dependencies,
                            &module_name,
                            &funcdef.name,
                            &param.param_type,
                            &dep_infos,
                            &new_registered_types,
                        )?;
                    }
                    comps.push(ComponentChange::SaveFunc {
                        name: funcdef.name.clone(),
                        parsing: funcdef.clone(),
                        not_backward_compatible: change == Change::NotCompatible,
                        dependencies,
                    });
                }
            }
        }
        for type_name in &added_types {
            if !all_new_types.contains(type_name) {
                return Err(SpecParseError::AddedTypeNotInSpec(type_name.clone()).into());
            }
        }
        for type_name in &new_registered_types {
            if !all_new_types.contains(type_name) {
                warn!(
                    module = %module_name,
                    type_name = %type_name,
                    "registered type is missing from the new spec; unregistering it implicitly"
                );
                unregistered_types.insert(type_name.clone());
            }
        }
        for type_name in &unregistered_types {
            comps.push(ComponentChange::DeleteType {
                name: type_name.clone(),
            });
            let type_def_name = TypeDefName::new(module_name.clone(), type_name.clone());
            ret.insert(
                type_def_name,
                TypeChange {
                    unregistered: true,
                    new_type_version: None,
                    json_schema_document: None,
                },
            );
        }
        for func_name in &old_registered_funcs {
            if !all_new_funcs.contains(func_name) {
                comps.push(ComponentChange::DeleteFunc {
                    name: func_name.clone(),
                });
            }
        }

        if prev_md5.is_some()
            && prev_md5 == info.md5_hash
            && prev_includes == info.included_module_name_to_version
            && comps.is_empty()
        {
            let prev_spec = self
                .storage
                .get_module_spec_record(&module_name, info.version_time)?;
            if prev_spec == spec_document {
                return Err(SpecParseError::NoDifference(module_name).into());
            }
        }
        if dry_run {
            return Ok(ret);
        }

        let transaction = self.storage.generate_new_module_version(&module_name)?;
        match self.commit_module_save(&mut info, &spec_document, comps, transaction) {
            Ok(()) => Ok(ret),
            Err(err) => {
                self.rollback_module_transaction(&module_name, transaction);
                Err(err)
            }
        }
    }

    fn commit_module_save(
        &self,
        info: &mut ModuleInfo,
        spec: &str,
        comps: Vec<ComponentChange>,
        transaction: u64,
    ) -> TypeDbResult<()> {
        let mut created_type_refs: BTreeSet<RefInfo> = BTreeSet::new();
        let mut created_func_refs: BTreeSet<RefInfo> = BTreeSet::new();
        for comp in comps {
            match comp {
                ComponentChange::SaveType {
                    name,
                    json_schema,
                    parsing,
                    not_backward_compatible,
                    dependencies,
                } => {
                    let version = compat::next_version(
                        Self::last_type_version_in_info(info, &name, true)?,
                        not_backward_compatible,
                    );
                    info.types
                        .entry(name.clone())
                        .or_insert_with(|| TypeInfo {
                            type_name: name.clone(),
                            type_version: String::new(),
                            supported: true,
                        })
                        .supported = true;
                    let refs = self.persist_type(
                        info,
                        &name,
                        version,
                        &json_schema,
                        &parsing,
                        dependencies,
                        transaction,
                    )?;
                    created_type_refs.extend(refs);
                }
                ComponentChange::DeleteType { name } => {
                    let ti = info.types.get_mut(&name).ok_or_else(|| {
                        TypeDbError::NoSuchType(format!(
                            "unable to locate type: {}.{name}",
                            info.module_name
                        ))
                    })?;
                    ti.supported = false;
                }
                ComponentChange::SaveFunc {
                    name,
                    parsing,
                    not_backward_compatible,
                    dependencies,
                } => {
                    let version = compat::next_version(
                        Self::last_func_version_in_info(info, &name, true)?,
                        not_backward_compatible,
                    );
                    info.funcs
                        .entry(name.clone())
                        .or_insert_with(|| FuncInfo {
                            func_name: name.clone(),
                            func_version: String::new(),
                            supported: true,
                        })
                        .supported = true;
                    let refs =
                        self.persist_func(info, &name, version, &parsing, dependencies, transaction)?;
                    created_func_refs.extend(refs);
                }
                ComponentChange::DeleteFunc { name } => {
                    let fi = info.funcs.get_mut(&name).ok_or_else(|| {
                        TypeDbError::NoSuchFunc(format!(
                            "unable to locate function: {}.{name}",
                            info.module_name
                        ))
                    })?;
                    fi.supported = false;
                }
            }
        }
        info.version_time = transaction;
        self.storage.write_module_records(info, spec, transaction)?;
        self.storage.add_refs(&created_type_refs, &created_func_refs)?;
        Ok(())
    }

    /// Write the schema and parse records for one type version and fill in
    /// the collected refs.
    fn persist_type(
        &self,
        info: &mut ModuleInfo,
        name: &str,
        version: SemanticVersion,
        json_schema: &str,
        parsing: &Typedef,
        dependencies: BTreeSet<RefInfo>,
        module_version: u64,
    ) -> TypeDbResult<BTreeSet<RefInfo>> {
        let version_text = version.to_string();
        let entry = info.types.get_mut(name).ok_or_else(|| {
            SpecParseError::Internal(format!("type has no registration record: {name}"))
        })?;
        entry.type_version = version_text.clone();
        let mut filled = BTreeSet::new();
        for mut dep in dependencies {
            dep.dep_version = Some(version_text.clone());
            dep.dep_module_version = module_version;
            fill_internal_ref_version(&mut dep, info)?;
            filled.insert(dep);
        }
        let md5 = Md5Hash::digest(json_schema.as_bytes());
        self.storage.write_type_schema_record(
            &info.module_name,
            name,
            &version_text,
            module_version,
            json_schema,
            md5.as_hex(),
        )?;
        let parse_doc = parsing
            .canonical_json()
            .map_err(|e| SpecParseError::Internal(e.to_string()))?;
        self.storage.write_type_parse_record(
            &info.module_name,
            name,
            &version_text,
            module_version,
            &parse_doc,
        )?;
        Ok(filled)
    }

    fn persist_func(
        &self,
        info: &mut ModuleInfo,
        name: &str,
        version: SemanticVersion,
        parsing: &Funcdef,
        dependencies: BTreeSet<RefInfo>,
        module_version: u64,
    ) -> TypeDbResult<BTreeSet<RefInfo>> {
        let version_text = version.to_string();
        let entry = info.funcs.get_mut(name).ok_or_else(|| {
            SpecParseError::Internal(format!("function has no registration record: {name}"))
        })?;
        entry.func_version = version_text.clone();
        let mut filled = BTreeSet::new();
        for mut dep in dependencies {
            dep.dep_version = Some(version_text.clone());
            dep.dep_module_version = module_version;
            fill_internal_ref_version(&mut dep, info)?;
            filled.insert(dep);
        }
        let parse_doc = parsing
            .canonical_json()
            .map_err(|e| SpecParseError::Internal(e.to_string()))?;
        self.storage.write_func_parse_record(
            &info.module_name,
            name,
            &version_text,
            module_version,
            &parse_doc,
        )?;
        Ok(filled)
    }

    fn find_type_change(&self, info: &ModuleInfo, new_type: &Typedef) -> TypeDbResult<Change> {
        let Some(ti) = info.types.get(&new_type.name) else {
            return Ok(Change::NotCompatible);
        };
        let old_type = self.load_type_parse(&info.module_name, &ti.type_name, &ti.type_version)?;
        Ok(compat::find_typedef_change(&old_type, new_type))
    }

    fn find_func_change(&self, info: &ModuleInfo, new_func: &Funcdef) -> TypeDbResult<Change> {
        let Some(fi) = info.funcs.get(&new_func.name) else {
            return Ok(Change::NotCompatible);
        };
        let old_func = self.load_func_parse(&info.module_name, &fi.func_name, &fi.func_version)?;
        Ok(compat::find_func_change(&old_func, new_func))
    }

    // --- include closure and compilation ---

    fn compile_spec(
        &self,
        spec: &str,
        included_modules: &[String],
        restrictions: &BTreeMap<String, u64>,
    ) -> TypeDbResult<CompiledSpec> {
        let mut dep_infos = BTreeMap::new();
        let mut dep_specs = BTreeMap::new();
        let mut visited: BTreeMap<String, (u64, String)> = BTreeMap::new();
        for dep in included_modules {
            let version = match restrictions.get(dep) {
                Some(version) => *version,
                None => self.get_latest_module_version(dep)?,
            };
            self.load_included_module_recursive(
                dep,
                version,
                "RootModule",
                &mut visited,
                restrictions,
                &mut dep_specs,
                &mut dep_infos,
            )?;
        }
        let output = match self.parser_source {
            ParserSource::Internal => self.internal_parser.compile(spec, &dep_specs, None)?,
            ParserSource::External | ParserSource::Both => {
                let external = self.external_parser.as_deref().ok_or_else(|| {
                    TypeDbError::Configuration(
                        "external parser backend is not configured".to_string(),
                    )
                })?;
                let work_dir = self.create_temp_dir()?;
                stage_spec_files(work_dir.path(), spec, &dep_specs)?;
                if self.parser_source == ParserSource::Both {
                    compile_dual(
                        external,
                        &self.internal_parser,
                        spec,
                        &dep_specs,
                        Some(work_dir.path()),
                    )?
                } else {
                    external.compile(spec, &dep_specs, Some(work_dir.path()))?
                }
            }
        };
        let service = match <[_; 1]>::try_from(output.services) {
            Ok([service]) => service,
            Err(services) => return Err(SpecParseError::NotOneService(services.len()).into()),
        };
        let module = match <[_; 1]>::try_from(service.modules) {
            Ok([module]) => module,
            Err(modules) => return Err(SpecParseError::NotOneModule(modules.len()).into()),
        };
        Ok(CompiledSpec {
            module,
            schemas: output.schemas,
            dep_infos,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn load_included_module_recursive(
        &self,
        module: &str,
        version: u64,
        parent_path: &str,
        visited: &mut BTreeMap<String, (u64, String)>,
        restrictions: &BTreeMap<String, u64>,
        specs: &mut BTreeMap<String, String>,
        infos: &mut BTreeMap<String, ModuleInfo>,
    ) -> TypeDbResult<()> {
        let info = self.get_module_info(&ModuleDefId::at_version(module, version))?;
        let current_path = format!("{module}({version})<-{parent_path}");
        if let Some(restriction) = restrictions.get(module) {
            if version != *restriction {
                return Err(SpecParseError::PinnedVersionMismatch {
                    path: current_path,
                    restriction: *restriction,
                }
                .into());
            }
        }
        if let Some((visited_version, visited_path)) = visited.get(module) {
            if *visited_version != version {
                return Err(SpecParseError::DependencyVersionConflict(
                    visited_path.clone(),
                    current_path,
                )
                .into());
            }
            return Ok(());
        }
        let spec = self.get_module_spec_document(&ModuleDefId::at_version(module, version))?;
        visited.insert(module.to_string(), (version, current_path.clone()));
        specs.insert(module.to_string(), spec);
        infos.insert(module.to_string(), info.clone());
        for (included, included_version) in &info.included_module_name_to_version {
            self.load_included_module_recursive(
                included,
                *included_version,
                &current_path,
                visited,
                restrictions,
                specs,
                infos,
            )?;
        }
        Ok(())
    }

    fn create_temp_dir(&self) -> TypeDbResult<TempWorkDir> {
        let mut suffix = self.temp_suffix.lock().unwrap();
        loop {
            let candidate = self.temp_root.join(format!("temp_{}", *suffix));
            *suffix += 1;
            if !candidate.exists() {
                fs::create_dir_all(&candidate)
                    .map_err(|e| TypeDbError::Storage(TypeStorageError::from(e)))?;
                return Ok(TempWorkDir { path: candidate });
            }
        }
    }

    // --- release ---

    /// Promote every `0.x` type and function of the latest committed
    /// version to `1.0` and mark that version released. Returns the
    /// absolute ids of all module types after release.
    pub fn release_module(
        &self,
        module: &str,
        user_id: &str,
    ) -> TypeDbResult<Vec<AbsoluteTypeDefId>> {
        self.check_user_is_owner_or_admin(module, user_id)?;
        self.check_module_registered(module)?;
        self.check_module_supported(module)?;
        let version = self.storage.get_last_module_version_with_unreleased(module)?;
        self.check_module(module, Some(version))?;
        let mut info = self.storage.get_module_info_record(module, version)?;
        {
            let _write = self.write_lock(module)?;
            let mut types_to_release = Vec::new();
            for (name, ti) in &info.types {
                if Self::parse_stored_version(&ti.type_version)?.major == 0 {
                    types_to_release.push(name.clone());
                }
            }
            let mut funcs_to_release = Vec::new();
            for (name, fi) in &info.funcs {
                if Self::parse_stored_version(&fi.func_version)?.major == 0 {
                    funcs_to_release.push(name.clone());
                }
            }
            if types_to_release.is_empty() && funcs_to_release.is_empty() {
                self.storage.set_module_release_version(module, version)?;
            } else {
                info.upload_user_id = Some(user_id.to_string());
                info.upload_method = Some("releaseModule".to_string());
                let transaction = self.storage.generate_new_module_version(module)?;
                if let Err(err) = self.commit_release(
                    &mut info,
                    module,
                    version,
                    &types_to_release,
                    &funcs_to_release,
                    transaction,
                ) {
                    self.rollback_module_transaction(module, transaction);
                    return Err(err);
                }
            }
        }
        let mut ret = Vec::new();
        for ti in info.types.values() {
            ret.push(AbsoluteTypeDefId::new(
                TypeDefName::new(module, ti.type_name.clone()),
                Self::parse_stored_version(&ti.type_version)?,
            ));
        }
        Ok(ret)
    }

    fn commit_release(
        &self,
        info: &mut ModuleInfo,
        module: &str,
        prior_version: u64,
        types_to_release: &[String],
        funcs_to_release: &[String],
        transaction: u64,
    ) -> TypeDbResult<()> {
        let mut new_type_refs: BTreeSet<RefInfo> = BTreeSet::new();
        let mut new_func_refs: BTreeSet<RefInfo> = BTreeSet::new();
        for name in types_to_release {
            let current_version = info
                .types
                .get(name)
                .map(|ti| ti.type_version.clone())
                .ok_or_else(|| {
                    SpecParseError::Internal(format!("released type vanished from info: {name}"))
                })?;
            let json_schema = self
                .storage
                .get_type_schema_record(module, name, &current_version)?
                .ok_or_else(|| {
                    TypeDbError::NoSuchType(format!(
                        "unable to read type schema record: {module}.{name}"
                    ))
                })?;
            let dependencies = self
                .storage
                .get_type_refs_by_dep(module, name, &current_version)?;
            let parsing = self.load_type_parse(module, name, &current_version)?;
            let refs = self.persist_type(
                info,
                name,
                SemanticVersion::RELEASE,
                &json_schema,
                &parsing,
                dependencies,
                transaction,
            )?;
            new_type_refs.extend(refs);
        }
        for name in funcs_to_release {
            let current_version = info
                .funcs
                .get(name)
                .map(|fi| fi.func_version.clone())
                .ok_or_else(|| {
                    SpecParseError::Internal(format!("released function vanished from info: {name}"))
                })?;
            let dependencies =
                self.storage
                    .get_func_refs_by_dep(module, name, Some(&current_version))?;
            let parsing = self.load_func_parse(module, name, &current_version)?;
            let refs = self.persist_func(
                info,
                name,
                SemanticVersion::RELEASE,
                &parsing,
                dependencies,
                transaction,
            )?;
            new_func_refs.extend(refs);
        }
        let spec = self.storage.get_module_spec_record(module, prior_version)?;
        info.version_time = transaction;
        self.storage.write_module_records(info, &spec, transaction)?;
        self.storage.add_refs(&new_type_refs, &new_func_refs)?;
        self.storage.set_module_release_version(module, transaction)?;
        Ok(())
    }

    // --- rollback ---

    /// Delete everything stamped with `version` and revert the module head
    /// to the previous committed version. Failures are logged and
    /// swallowed; a save never double-faults.
    pub(super) fn rollback_module_transaction(&self, module: &str, version: u64) {
        let result = (|| -> TypeDbResult<()> {
            let mut versions: BTreeSet<u64> = self
                .storage
                .get_all_module_versions(module)?
                .into_keys()
                .collect();
            versions.remove(&version);
            let previous = versions.iter().next_back().copied().unwrap_or(0);
            Ok(self
                .storage
                .remove_module_version_and_switch_if_not_current(module, version, previous)?)
        })();
        if let Err(err) = result {
            warn!(module = %module, error = %err, "rollback of module transaction failed");
        }
    }
}

/// Refs of one typedef: every terminal reference reachable from its alias
/// type.
fn extract_typedef_refs(
    typedef: &Typedef,
    dep_infos: &BTreeMap<String, ModuleInfo>,
    registered_types: &BTreeSet<String>,
) -> TypeDbResult<BTreeSet<RefInfo>> {
    let mut ret = BTreeSet::new();
    collect_type_refs(
        &mut ret,
        &typedef.module,
        &typedef.name,
        &typedef.alias_type,
        dep_infos,
        registered_types,
    )?;
    Ok(ret)
}

/// Walk a type collecting terminal references: a reference into another
/// module, or to a registered type of the current module. Aliases to
/// unregistered local typedefs are followed transparently.
fn collect_type_refs(
    out: &mut BTreeSet<RefInfo>,
    dep_module: &str,
    dep_name: &str,
    node: &Type,
    dep_infos: &BTreeMap<String, ModuleInfo>,
    registered_types: &BTreeSet<String>,
) -> TypeDbResult<()> {
    match node {
        Type::Typedef(inner) => {
            let is_outer_module = inner.module != dep_module;
            let terminal = is_outer_module || registered_types.contains(&inner.name);
            if terminal {
                let ref_version = if is_outer_module {
                    let ref_type = dep_infos
                        .get(&inner.module)
                        .and_then(|info| info.types.get(&inner.name));
                    let Some(ref_type) = ref_type else {
                        return Err(SpecParseError::UnresolvedReference(format!(
                            "{}.{}",
                            inner.module, inner.name
                        ))
                        .into());
                    };
                    Some(ref_type.type_version.clone())
                } else {
                    None
                };
                out.insert(RefInfo {
                    dep_module: dep_module.to_string(),
                    dep_name: dep_name.to_string(),
                    dep_version: None,
                    dep_module_version: 0,
                    ref_module: inner.module.clone(),
                    ref_name: inner.name.clone(),
                    ref_version,
                });
            } else {
                collect_type_refs(
                    out,
                    dep_module,
                    dep_name,
                    &inner.alias_type,
                    dep_infos,
                    registered_types,
                )?;
            }
        }
        Type::List(elem) => {
            collect_type_refs(out, dep_module, dep_name, elem, dep_infos, registered_types)?;
        }
        Type::Mapping { value, .. } => {
            collect_type_refs(out, dep_module, dep_name, value, dep_infos, registered_types)?;
        }
        Type::Struct(st) => {
            for item in &st.items {
                collect_type_refs(
                    out,
                    dep_module,
                    dep_name,
                    &item.item_type,
                    dep_infos,
                    registered_types,
                )?;
            }
        }
        Type::Tuple(elems) => {
            for elem in elems {
                collect_type_refs(out, dep_module, dep_name, elem, dep_infos, registered_types)?;
            }
        }
        Type::Scalar(_) | Type::UnspecifiedObject => {}
    }
    Ok(())
}

/// Back-fill an intra-module ref with the current version of the
/// referenced type; cross-module refs must already carry one.
fn fill_internal_ref_version(dep: &mut RefInfo, info: &ModuleInfo) -> TypeDbResult<()> {
    if dep.ref_version.is_none() && dep.ref_module != info.module_name {
        return Err(SpecParseError::Internal(format!(
            "type reference has no version but is not internal: {}.{}",
            dep.ref_module, dep.ref_name
        ))
        .into());
    }
    if dep.ref_module == info.module_name {
        let ti = info.types.get(&dep.ref_name).ok_or_else(|| {
            SpecParseError::Internal(format!(
                "referenced type was not found: {}.{}",
                dep.ref_module, dep.ref_name
            ))
        })?;
        dep.ref_version = Some(ti.type_version.clone());
    }
    Ok(())
}

fn stage_spec_files(
    dir: &Path,
    spec: &str,
    includes: &BTreeMap<String, String>,
) -> TypeDbResult<()> {
    fs::write(dir.join("currentlyCompiled.spec"), spec)
        .map_err(|e| TypeDbError::Storage(TypeStorageError::from(e)))?;
    for (name, text) in includes {
        fs::write(dir.join(format!("{name}.types")), text)
            .map_err(|e| TypeDbError::Storage(TypeStorageError::from(e)))?;
    }
    Ok(())
}
