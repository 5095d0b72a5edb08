//! Registry invariants: digest identity, ref completeness, rollback
//! atomicity, version monotonicity, resolution rules, and retirement.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use typedefdb::config::TypeDbConfig;
use typedefdb::ident::{Md5Hash, ModuleDefId, SemanticVersion, TypeDefId, TypeDefName};
use typedefdb::registry::{SaveOptions, TypeDbError, TypeDefDb};
use typedefdb::storage::{
    FileStorage, MemoryStorage, ModuleInfo, OwnerInfo, RefInfo, StorageResult, TypeStorage,
};
use typedefdb::users::StaticAdminList;

const ADMIN: &str = "root";
const OWNER: &str = "alice";

// =============================================================================
// Helper Functions
// =============================================================================

fn admins() -> Arc<StaticAdminList> {
    Arc::new(StaticAdminList::new([ADMIN]))
}

fn new_db() -> TypeDefDb {
    TypeDefDb::new(Arc::new(MemoryStorage::new()), admins(), TypeDbConfig::default()).unwrap()
}

fn register_module(db: &TypeDefDb, module: &str, owner: &str) {
    db.request_module_registration(module, owner).unwrap();
    db.approve_module_registration_request(ADMIN, module).unwrap();
}

fn save(db: &TypeDefDb, spec: &str, added: &[&str]) {
    db.register_module(
        spec,
        SaveOptions {
            added_types: added.iter().map(|s| s.to_string()).collect(),
            ..SaveOptions::default()
        },
        OWNER,
    )
    .unwrap();
}

// =============================================================================
// Digest identity
// =============================================================================

/// The stored MD5 is the digest of the stored schema document, and the
/// type can be resolved back through it.
#[test]
fn test_md5_round_trip() {
    let db = new_db();
    register_module(&db, "ModA", OWNER);
    save(&db, "module ModA {\n typedef int T;\n};\n", &["T"]);

    let pinned: TypeDefId = "ModA.T-0.1".parse().unwrap();
    let document = db.get_json_schema_document(&pinned).unwrap();
    let md5 = db.get_type_md5_version(&pinned).unwrap();
    assert_eq!(md5, Md5Hash::digest(document.as_bytes()));

    let by_md5 = TypeDefId::with_md5(TypeDefName::new("ModA", "T"), md5);
    let resolved = db.resolve_type_def_id(&by_md5).unwrap();
    assert_eq!(resolved.version, SemanticVersion::new(0, 1));

    let versions = db.get_type_versions_for_md5(&by_md5).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, SemanticVersion::new(0, 1));
}

/// MD5 resolution returns the highest of several versions sharing one
/// schema document.
#[test]
fn test_md5_resolution_picks_highest_version() {
    let db = new_db();
    register_module(&db, "ModA", OWNER);
    save(&db, "module ModA {\n typedef int T;\n};\n", &["T"]);
    // same structure, new comment: schema changes
    save(&db, "module ModA {\n /* v2 */\n typedef int T;\n};\n", &[]);
    // back to the original text: schema bytes match version 0.1 again
    save(&db, "module ModA {\n typedef int T;\n};\n", &[]);

    let pinned: TypeDefId = "ModA.T-0.3".parse().unwrap();
    let md5 = db.get_type_md5_version(&pinned).unwrap();
    let by_md5 = TypeDefId::with_md5(TypeDefName::new("ModA", "T"), md5);
    // 0.1 and 0.3 share the document; resolution picks 0.3
    assert_eq!(db.get_type_versions_for_md5(&by_md5).unwrap().len(), 2);
    assert_eq!(
        db.resolve_type_def_id(&by_md5).unwrap().version,
        SemanticVersion::new(0, 3)
    );
}

// =============================================================================
// Version resolution rules
// =============================================================================

#[test]
fn test_major_only_resolution_uses_released_versions() {
    let db = new_db();
    register_module(&db, "ModA", OWNER);
    save(&db, "module ModA {\n typedef int T;\n};\n", &["T"]);
    db.release_module("ModA", OWNER).unwrap();
    // two further saves: 1.1 and then 2.0, both unreleased
    save(&db, "module ModA {\n /* doc */\n typedef int T;\n};\n", &[]);
    save(&db, "module ModA {\n typedef string T;\n};\n", &[]);

    let name = TypeDefName::new("ModA", "T");
    // only 1.0 lives in a released module version so far
    let major_one = TypeDefId::with_major(name.clone(), 1);
    assert_eq!(
        db.resolve_type_def_id(&major_one).unwrap().version,
        SemanticVersion::new(1, 0)
    );
    // unreleased majors resolve to nothing
    let major_two = TypeDefId::with_major(name.clone(), 2);
    assert!(matches!(
        db.resolve_type_def_id(&major_two).unwrap_err(),
        TypeDbError::NoSuchType(_)
    ));

    // release: the latest version (2.0) becomes released
    db.release_module("ModA", OWNER).unwrap();
    assert_eq!(
        db.resolve_type_def_id(&major_two).unwrap().version,
        SemanticVersion::new(2, 0)
    );
    // 1.1 was committed in a version that never got released
    assert_eq!(
        db.resolve_type_def_id(&major_one).unwrap().version,
        SemanticVersion::new(1, 0)
    );

    // an exact pin reaches unreleased versions
    let exact = TypeDefId::with_version(name, SemanticVersion::new(1, 1));
    assert_eq!(
        db.resolve_type_def_id(&exact).unwrap().version,
        SemanticVersion::new(1, 1)
    );
}

/// Type versions are monotonically non-decreasing across the committed
/// history of a module.
#[test]
fn test_type_versions_monotonic_across_history() {
    let db = new_db();
    register_module(&db, "ModA", OWNER);
    save(&db, "module ModA {\n typedef int T;\n};\n", &["T"]);
    save(&db, "module ModA {\n typedef string T;\n};\n", &[]);
    db.release_module("ModA", OWNER).unwrap();
    save(&db, "module ModA {\n typedef int T;\n};\n", &[]);

    let versions = db
        .get_all_module_versions_with_unreleased("ModA", OWNER)
        .unwrap();
    let mut last: Option<SemanticVersion> = None;
    for module_version in versions {
        let info = db
            .get_module_info(&ModuleDefId::at_version("ModA", module_version))
            .unwrap();
        if let Some(ti) = info.types.get("T") {
            let version: SemanticVersion = ti.type_version.parse().unwrap();
            if let Some(prev) = last {
                assert!(version >= prev, "{version} went backwards from {prev}");
            }
            last = Some(version);
        }
    }
    assert_eq!(last, Some(SemanticVersion::new(2, 0)));
}

// =============================================================================
// Include closure and refs
// =============================================================================

fn setup_dep_and_main(db: &TypeDefDb) {
    register_module(db, "Dep", OWNER);
    save(db, "module Dep {\n typedef string Handle;\n};\n", &["Handle"]);
    db.release_module("Dep", OWNER).unwrap();

    register_module(db, "Main", OWNER);
    save(
        db,
        "#include <Dep.types>\nmodule Main {\n typedef Dep.Handle H;\n};\n",
        &["H"],
    );
}

/// A cross-module reference records a ref with concrete versions on both
/// sides, stamped with the committing module version.
#[test]
fn test_cross_module_refs_are_recorded() {
    let db = new_db();
    setup_dep_and_main(&db);

    let h: TypeDefId = "Main.H-0.1".parse().unwrap();
    let refs = db.get_type_refs_by_dep(&h).unwrap();
    assert_eq!(refs.len(), 1);
    let r = refs.iter().next().unwrap();
    assert_eq!(r.dep_module, "Main");
    assert_eq!(r.dep_name, "H");
    assert_eq!(r.dep_version.as_deref(), Some("0.1"));
    assert_eq!(r.ref_module, "Dep");
    assert_eq!(r.ref_name, "Handle");
    assert_eq!(r.ref_version.as_deref(), Some("1.0"));
    let committed = db
        .get_latest_module_version_with_unreleased("Main", OWNER)
        .unwrap();
    assert_eq!(r.dep_module_version, committed);

    // reverse direction, queried from the referenced side
    let handle = TypeDefId::with_version(TypeDefName::new("Dep", "Handle"), SemanticVersion::new(1, 0));
    let back = db.get_type_refs_by_ref(&handle).unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(back.iter().next().unwrap().dep_name, "H");

    // the include pin is recorded on the module version
    let info = db
        .get_module_info(&ModuleDefId::at_version("Main", committed))
        .unwrap();
    assert_eq!(
        info.included_module_name_to_version.get("Dep").copied(),
        Some(db.get_latest_module_version("Dep").unwrap())
    );
}

/// Refreshing after a dependency release re-pins the include map without
/// touching unchanged types.
#[test]
fn test_refresh_repins_dependency() {
    let db = new_db();
    setup_dep_and_main(&db);
    let old_pin = db.get_latest_module_version("Dep").unwrap();

    // dependency grows and releases a new version
    save(
        &db,
        "module Dep {\n typedef string Handle;\n typedef int Count;\n};\n",
        &["Count"],
    );
    db.release_module("Dep", OWNER).unwrap();
    let new_pin = db.get_latest_module_version("Dep").unwrap();
    assert!(new_pin > old_pin);

    db.refresh_module("Main", SaveOptions::default(), OWNER).unwrap();
    let committed = db
        .get_latest_module_version_with_unreleased("Main", OWNER)
        .unwrap();
    let info = db
        .get_module_info(&ModuleDefId::at_version("Main", committed))
        .unwrap();
    assert_eq!(
        info.included_module_name_to_version.get("Dep").copied(),
        Some(new_pin)
    );
    // H itself did not change
    assert_eq!(info.types["H"].type_version, "0.1");
}

/// A version restriction that contradicts a transitive pin is rejected.
#[test]
fn test_pinned_version_mismatch() {
    let db = new_db();
    setup_dep_and_main(&db);
    db.release_module("Main", OWNER).unwrap();

    // Dep moves on
    save(&db, "module Dep {\n typedef string Handle;\n typedef int Count;\n};\n", &["Count"]);
    db.release_module("Dep", OWNER).unwrap();
    let new_dep = db.get_latest_module_version("Dep").unwrap();

    // Top includes Main, whose stored pin references the old Dep version;
    // restricting Dep to its new version contradicts that pin
    register_module(&db, "Top", OWNER);
    let err = db
        .register_module(
            "#include <Main.types>\nmodule Top {\n typedef Main.H TH;\n};\n",
            SaveOptions {
                added_types: ["TH".to_string()].into(),
                module_version_restrictions: BTreeMap::from([("Dep".to_string(), new_dep)]),
                ..SaveOptions::default()
            },
            OWNER,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TypeDbError::SpecParse(typedefdb::parser::SpecParseError::PinnedVersionMismatch { .. })
    ));
}

/// Two include paths reaching the same module at different versions are
/// rejected.
#[test]
fn test_dependency_version_conflict() {
    let db = new_db();
    setup_dep_and_main(&db);
    db.release_module("Main", OWNER).unwrap();

    save(&db, "module Dep {\n typedef string Handle;\n typedef int Count;\n};\n", &["Count"]);
    db.release_module("Dep", OWNER).unwrap();

    // direct include resolves Dep at its latest release; Main's stored pin
    // still references the previous one
    register_module(&db, "Top", OWNER);
    let err = db
        .register_module(
            "#include <Dep.types>\n#include <Main.types>\nmodule Top {\n typedef Dep.Handle TH;\n};\n",
            SaveOptions {
                added_types: ["TH".to_string()].into(),
                ..SaveOptions::default()
            },
            OWNER,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TypeDbError::SpecParse(
            typedefdb::parser::SpecParseError::DependencyVersionConflict(_, _)
        )
    ));
}

// =============================================================================
// Rollback atomicity
// =============================================================================

/// Storage wrapper that can be told to fail `add_refs`, which happens at
/// the end of the commit block.
struct FailingStorage {
    inner: Arc<MemoryStorage>,
    fail_add_refs: AtomicBool,
}

impl TypeStorage for FailingStorage {
    fn check_module_exists(&self, module: &str) -> StorageResult<bool> {
        self.inner.check_module_exists(module)
    }
    fn init_module_info_record(&self, module: &str) -> StorageResult<u64> {
        self.inner.init_module_info_record(module)
    }
    fn get_all_module_versions(&self, module: &str) -> StorageResult<BTreeMap<u64, bool>> {
        self.inner.get_all_module_versions(module)
    }
    fn get_last_released_module_version(&self, module: &str) -> StorageResult<u64> {
        self.inner.get_last_released_module_version(module)
    }
    fn get_last_module_version_with_unreleased(&self, module: &str) -> StorageResult<u64> {
        self.inner.get_last_module_version_with_unreleased(module)
    }
    fn generate_new_module_version(&self, module: &str) -> StorageResult<u64> {
        self.inner.generate_new_module_version(module)
    }
    fn write_module_records(
        &self,
        info: &ModuleInfo,
        spec: &str,
        version_time: u64,
    ) -> StorageResult<()> {
        self.inner.write_module_records(info, spec, version_time)
    }
    fn get_module_info_record(&self, module: &str, version: u64) -> StorageResult<ModuleInfo> {
        self.inner.get_module_info_record(module, version)
    }
    fn get_module_spec_record(&self, module: &str, version: u64) -> StorageResult<String> {
        self.inner.get_module_spec_record(module, version)
    }
    fn check_module_info_record_exists(&self, module: &str, version: u64) -> StorageResult<bool> {
        self.inner.check_module_info_record_exists(module, version)
    }
    fn check_module_spec_record_exists(&self, module: &str, version: u64) -> StorageResult<bool> {
        self.inner.check_module_spec_record_exists(module, version)
    }
    fn set_module_release_version(&self, module: &str, version: u64) -> StorageResult<()> {
        self.inner.set_module_release_version(module, version)
    }
    fn remove_module_version_and_switch_if_not_current(
        &self,
        module: &str,
        version: u64,
        previous: u64,
    ) -> StorageResult<()> {
        self.inner
            .remove_module_version_and_switch_if_not_current(module, version, previous)
    }
    fn get_module_supported_state(&self, module: &str) -> StorageResult<bool> {
        self.inner.get_module_supported_state(module)
    }
    fn change_module_supported_state(&self, module: &str, supported: bool) -> StorageResult<()> {
        self.inner.change_module_supported_state(module, supported)
    }
    fn remove_module(&self, module: &str) -> StorageResult<()> {
        self.inner.remove_module(module)
    }
    fn get_all_registered_modules(&self, include_unsupported: bool) -> StorageResult<Vec<String>> {
        self.inner.get_all_registered_modules(include_unsupported)
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
        self.inner
            .write_type_schema_record(module, type_name, version, module_version, document, md5)
    }
    fn write_type_parse_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
    ) -> StorageResult<()> {
        self.inner
            .write_type_parse_record(module, type_name, version, module_version, document)
    }
    fn write_func_parse_record(
        &self,
        module: &str,
        func_name: &str,
        version: &str,
        module_version: u64,
        document: &str,
    ) -> StorageResult<()> {
        self.inner
            .write_func_parse_record(module, func_name, version, module_version, document)
    }
    fn get_type_schema_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>> {
        self.inner.get_type_schema_record(module, type_name, version)
    }
    fn get_type_parse_record(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>> {
        self.inner.get_type_parse_record(module, type_name, version)
    }
    fn get_func_parse_record(
        &self,
        module: &str,
        func_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>> {
        self.inner.get_func_parse_record(module, func_name, version)
    }
    fn check_type_schema_record_exists(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<bool> {
        self.inner
            .check_type_schema_record_exists(module, type_name, version)
    }
    fn get_all_type_versions(
        &self,
        module: &str,
        type_name: &str,
    ) -> StorageResult<BTreeMap<String, bool>> {
        self.inner.get_all_type_versions(module, type_name)
    }
    fn get_type_versions_by_md5(
        &self,
        module: &str,
        type_name: &str,
        md5: &str,
    ) -> StorageResult<Vec<String>> {
        self.inner.get_type_versions_by_md5(module, type_name, md5)
    }
    fn get_type_md5(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<Option<String>> {
        self.inner.get_type_md5(module, type_name, version)
    }
    fn get_module_versions_for_type_version(
        &self,
        module: &str,
        type_name: &str,
        version: &str,
    ) -> StorageResult<BTreeMap<u64, bool>> {
        self.inner
            .get_module_versions_for_type_version(module, type_name, version)
    }
    fn add_refs(
        &self,
        type_refs: &BTreeSet<RefInfo>,
        func_refs: &BTreeSet<RefInfo>,
    ) -> StorageResult<()> {
        if self.fail_add_refs.load(Ordering::SeqCst) {
            return Err(typedefdb::storage::TypeStorageError::Io(
                "injected add_refs failure".to_string(),
            ));
        }
        self.inner.add_refs(type_refs, func_refs)
    }
    fn get_type_refs_by_dep(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> StorageResult<BTreeSet<RefInfo>> {
        self.inner.get_type_refs_by_dep(module, name, version)
    }
    fn get_type_refs_by_ref(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> StorageResult<BTreeSet<RefInfo>> {
        self.inner.get_type_refs_by_ref(module, name, version)
    }
    fn get_func_refs_by_dep(
        &self,
        module: &str,
        name: &str,
        version: Option<&str>,
    ) -> StorageResult<BTreeSet<RefInfo>> {
        self.inner.get_func_refs_by_dep(module, name, version)
    }
    fn get_func_refs_by_ref(
        &self,
        module: &str,
        name: &str,
        version: &str,
    ) -> StorageResult<BTreeSet<RefInfo>> {
        self.inner.get_func_refs_by_ref(module, name, version)
    }
    fn get_owners_for_module(&self, module: &str) -> StorageResult<BTreeMap<String, OwnerInfo>> {
        self.inner.get_owners_for_module(module)
    }
    fn add_owner_to_module(
        &self,
        module: &str,
        user: &str,
        with_change_owners_privilege: bool,
    ) -> StorageResult<()> {
        self.inner
            .add_owner_to_module(module, user, with_change_owners_privilege)
    }
    fn remove_owner_from_module(&self, module: &str, user: &str) -> StorageResult<()> {
        self.inner.remove_owner_from_module(module, user)
    }
    fn get_modules_for_owner(&self, user: &str) -> StorageResult<Vec<String>> {
        self.inner.get_modules_for_owner(user)
    }
    fn add_new_module_registration_request(&self, module: &str, user: &str) -> StorageResult<()> {
        self.inner.add_new_module_registration_request(module, user)
    }
    fn get_new_module_registration_requests(&self) -> StorageResult<Vec<OwnerInfo>> {
        self.inner.get_new_module_registration_requests()
    }
    fn get_owner_for_new_module_registration_request(
        &self,
        module: &str,
    ) -> StorageResult<String> {
        self.inner.get_owner_for_new_module_registration_request(module)
    }
    fn remove_new_module_registration_request(
        &self,
        module: &str,
        user: &str,
    ) -> StorageResult<()> {
        self.inner.remove_new_module_registration_request(module, user)
    }
}

/// A commit failure rolls every record of the aborted `versionTime` back
/// and leaves the module at its previous head.
#[test]
fn test_failed_commit_rolls_back_cleanly() {
    let inner = Arc::new(MemoryStorage::new());
    let failing = Arc::new(FailingStorage {
        inner: Arc::clone(&inner),
        fail_add_refs: AtomicBool::new(false),
    });
    let db = TypeDefDb::new(failing.clone(), admins(), TypeDbConfig::default()).unwrap();
    register_module(&db, "ModA", OWNER);
    save(&db, "module ModA {\n typedef int T;\n};\n", &["T"]);
    let head_before = db
        .get_latest_module_version_with_unreleased("ModA", OWNER)
        .unwrap();

    failing.fail_add_refs.store(true, Ordering::SeqCst);
    let err = db
        .register_module(
            "module ModA {\n typedef string T;\n};\n",
            SaveOptions::default(),
            OWNER,
        )
        .unwrap_err();
    assert!(matches!(err, TypeDbError::Storage(_)));
    failing.fail_add_refs.store(false, Ordering::SeqCst);

    // the head did not move
    assert_eq!(
        db.get_latest_module_version_with_unreleased("ModA", OWNER)
            .unwrap(),
        head_before
    );
    // no record of the aborted version remains anywhere
    let versions = inner.get_all_module_versions("ModA").unwrap();
    assert!(versions.keys().all(|v| *v <= head_before));
    assert_eq!(inner.get_type_schema_record("ModA", "T", "0.2").unwrap(), None);
    assert_eq!(inner.get_type_parse_record("ModA", "T", "0.2").unwrap(), None);
    // the type still resolves at its previous version
    assert!(db.is_valid_type(&"ModA.T-0.1".parse().unwrap()).unwrap());
    assert!(!db.is_valid_type(&"ModA.T-0.2".parse().unwrap()).unwrap());
    // and the registry accepts new saves afterwards
    save(&db, "module ModA {\n typedef string T;\n};\n", &[]);
    assert!(db.is_valid_type(&"ModA.T-0.2".parse().unwrap()).unwrap());
}

// =============================================================================
// Retirement and removal
// =============================================================================

#[test]
fn test_retired_module_is_invisible() {
    let db = new_db();
    register_module(&db, "ModA", OWNER);
    save(&db, "module ModA {\n typedef int T;\n};\n", &["T"]);
    db.release_module("ModA", OWNER).unwrap();
    assert!(db.is_valid_module("ModA").unwrap());

    db.stop_module_support("ModA", ADMIN).unwrap();
    assert!(!db.is_valid_module("ModA").unwrap());
    assert!(matches!(
        db.get_latest_module_version("ModA").unwrap_err(),
        TypeDbError::NoSuchModule(_)
    ));
    assert!(matches!(
        db.resolve_type_def_id(&"ModA.T".parse().unwrap()).unwrap_err(),
        TypeDbError::NoSuchType(_)
    ));
    assert!(db.get_all_registered_modules().unwrap().is_empty());
    // owner listings filter retired modules too
    assert!(db.get_modules_by_owner(OWNER).unwrap().is_empty());

    // support flips are admin-only
    assert!(matches!(
        db.resume_module_support("ModA", OWNER).unwrap_err(),
        TypeDbError::NoSuchPrivilege(_)
    ));
    db.resume_module_support("ModA", ADMIN).unwrap();
    assert!(db.is_valid_module("ModA").unwrap());
    assert_eq!(
        db.resolve_type_def_id(&"ModA.T".parse().unwrap())
            .unwrap()
            .version,
        SemanticVersion::new(1, 0)
    );
    assert_eq!(db.get_modules_by_owner(OWNER).unwrap(), vec!["ModA"]);
}

#[test]
fn test_remove_module_is_admin_only_and_total() {
    let db = new_db();
    register_module(&db, "ModA", OWNER);
    save(&db, "module ModA {\n typedef int T;\n};\n", &["T"]);
    assert!(matches!(
        db.remove_module("ModA", OWNER).unwrap_err(),
        TypeDbError::NoSuchPrivilege(_)
    ));
    db.remove_module("ModA", ADMIN).unwrap();
    assert!(matches!(
        db.get_module_owners("ModA").unwrap_err(),
        TypeDbError::NoSuchModule(_)
    ));
    assert!(!db.is_valid_module("ModA").unwrap());
}

// =============================================================================
// Module version listings
// =============================================================================

#[test]
fn test_module_version_listings_hide_bootstrap_and_unreleased() {
    let db = new_db();
    register_module(&db, "ModA", OWNER);
    save(&db, "module ModA {\n typedef int T;\n};\n", &["T"]);
    save(&db, "module ModA {\n typedef string T;\n};\n", &[]);

    // nothing released beyond the bootstrap yet
    assert!(db.get_all_module_versions("ModA").unwrap().is_empty());
    let unreleased = db
        .get_all_module_versions_with_unreleased("ModA", OWNER)
        .unwrap();
    assert_eq!(unreleased.len(), 2);

    // non-owners may not see unreleased versions
    assert!(matches!(
        db.get_all_module_versions_with_unreleased("ModA", "mallory")
            .unwrap_err(),
        TypeDbError::NoSuchPrivilege(_)
    ));

    db.release_module("ModA", OWNER).unwrap();
    let released = db.get_all_module_versions("ModA").unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(
        released[0],
        db.get_latest_module_version("ModA").unwrap()
    );
}

// =============================================================================
// File-backed storage
// =============================================================================

/// The registry state survives a process restart on the file backend.
#[test]
fn test_file_storage_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let db = TypeDefDb::new(storage, admins(), TypeDbConfig::default()).unwrap();
        register_module(&db, "ModA", OWNER);
        save(&db, "module ModA {\n typedef int T;\n};\n", &["T"]);
        db.release_module("ModA", OWNER).unwrap();
    }
    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
    let db = TypeDefDb::new(storage, admins(), TypeDbConfig::default()).unwrap();
    assert!(db.is_valid_module("ModA").unwrap());
    assert_eq!(
        db.get_latest_type_version(&TypeDefName::new("ModA", "T")).unwrap(),
        SemanticVersion::new(1, 0)
    );
    assert!(db
        .get_json_schema_document(&"ModA.T".parse().unwrap())
        .unwrap()
        .contains("integer"));
}
