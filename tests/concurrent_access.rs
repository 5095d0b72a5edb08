//! Concurrent access: saves on one module serialize into distinct,
//! strictly increasing version times, and readers stay consistent while
//! writers run.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use typedefdb::config::TypeDbConfig;
use typedefdb::ident::TypeDefId;
use typedefdb::registry::{SaveOptions, TypeDbError, TypeDefDb};
use typedefdb::storage::MemoryStorage;
use typedefdb::users::StaticAdminList;

const ADMIN: &str = "root";
const OWNER: &str = "alice";

fn new_db() -> Arc<TypeDefDb> {
    Arc::new(
        TypeDefDb::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(StaticAdminList::new([ADMIN])),
            TypeDbConfig::default(),
        )
        .unwrap(),
    )
}

fn register_module(db: &TypeDefDb, module: &str) {
    db.request_module_registration(module, OWNER).unwrap();
    db.approve_module_registration_request(ADMIN, module).unwrap();
}

/// Competing saves on one module never share a version time. Contended
/// writers fail fast and retry.
#[test]
fn test_concurrent_saves_produce_distinct_version_times() {
    let db = new_db();
    register_module(&db, "ModA");
    db.register_module(
        "module ModA {\n typedef int T;\n};\n",
        SaveOptions {
            added_types: ["T".to_string()].into(),
            ..SaveOptions::default()
        },
        OWNER,
    )
    .unwrap();

    const WRITERS: usize = 4;
    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            // each writer adds its own type so every save has a real change
            let spec = format!("module ModA {{\n typedef int T;\n typedef int W{i};\n}};\n");
            let options = || SaveOptions {
                added_types: [format!("W{i}")].into(),
                ..SaveOptions::default()
            };
            barrier.wait();
            loop {
                match db.register_module(&spec, options(), OWNER) {
                    Ok(_) => break,
                    Err(TypeDbError::Lock(_)) => thread::yield_now(),
                    Err(other) => panic!("unexpected save failure: {other}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let versions = db
        .get_all_module_versions_with_unreleased("ModA", OWNER)
        .unwrap();
    // initial save plus one commit per writer, all distinct
    assert_eq!(versions.len(), 1 + WRITERS);
    let distinct: BTreeSet<u64> = versions.iter().copied().collect();
    assert_eq!(distinct.len(), versions.len());
    let mut sorted = versions.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, versions);
}

/// Readers run concurrently with writers and always observe a complete
/// snapshot: the resolved version always has its schema document.
#[test]
fn test_readers_stay_consistent_during_saves() {
    let db = new_db();
    register_module(&db, "ModA");
    db.register_module(
        "module ModA {\n typedef int T;\n};\n",
        SaveOptions {
            added_types: ["T".to_string()].into(),
            ..SaveOptions::default()
        },
        OWNER,
    )
    .unwrap();
    db.release_module("ModA", OWNER).unwrap();

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let id: TypeDefId = "ModA.T".parse().unwrap();
                for _ in 0..200 {
                    let abs = db.resolve_type_def_id(&id).unwrap();
                    let doc = db
                        .get_json_schema_document(&TypeDefId::from(abs.clone()))
                        .unwrap();
                    assert!(!doc.is_empty());
                }
            })
        })
        .collect();

    // the writer alternates the type shape and releases each save so the
    // readers' latest-version target keeps moving under them
    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            let specs = [
                "module ModA {\n typedef string T;\n};\n",
                "module ModA {\n typedef int T;\n};\n",
            ];
            for round in 0..10 {
                let spec = specs[round % 2];
                loop {
                    match db.register_module(spec, SaveOptions::default(), OWNER) {
                        Ok(_) => break,
                        Err(TypeDbError::Lock(_)) => thread::yield_now(),
                        Err(other) => panic!("unexpected save failure: {other}"),
                    }
                }
                loop {
                    match db.release_module("ModA", OWNER) {
                        Ok(_) => break,
                        Err(TypeDbError::Lock(_)) => thread::yield_now(),
                        Err(other) => panic!("unexpected release failure: {other}"),
                    }
                }
            }
        })
    };

    for reader in readers {
        reader.join().unwrap();
    }
    writer.join().unwrap();
}
