/// Unit of work tests
///
/// Commit replay against a real SQLite database.
/// Run with: cargo test --test unit_of_work_tests
mod common;

use common::{count_people, create_temp_db, create_test_db, seed, Person};
use rust_sqlite_mapper::query::{self, Conditions};
use rust_sqlite_mapper::{
    Connection, EntityState, FindOptions, MapperError, SqliteConfig, UnitOfWork,
};

fn find_person(conn: &mut Connection, id: i64) -> Option<Person> {
    conn.find(&Conditions::new().equal("ID", id), &FindOptions::new())
        .unwrap()
}

#[test]
fn test_commit_applies_created_modified_deleted() {
    let mut conn = create_test_db().unwrap();
    let ids = seed(
        &mut conn,
        &[
            Person::new("Stan", "Lee", 40, "Male"),
            Person::new("Ada", "Byron", 36, "Female"),
        ],
    )
    .unwrap();

    let mut uow = UnitOfWork::new(&mut conn);
    uow.add(Person::new("Fetty", "Wap", 21, "Male"));
    uow.update(Person {
        last_name: Some("MD".into()),
        ..Person::with_id(ids[0])
    });
    uow.remove(Person::with_id(ids[1]));
    assert_eq!(
        uow.tracked().iter().map(|t| t.state()).collect::<Vec<_>>(),
        vec![EntityState::Created, EntityState::Modified, EntityState::Deleted]
    );

    let summary = uow.commit().unwrap();
    assert_eq!((summary.inserted, summary.updated, summary.deleted), (1, 1, 1));
    assert_eq!(summary.rows_affected, 3);
    assert!(uow.is_empty());
    drop(uow);

    let created = find_person(&mut conn, summary.inserted_ids[0]).unwrap();
    assert_eq!(created.first_name.as_deref(), Some("Fetty"));

    // Partial update: null fields were left alone.
    let updated = find_person(&mut conn, ids[0]).unwrap();
    assert_eq!(updated.first_name.as_deref(), Some("Stan"));
    assert_eq!(updated.last_name.as_deref(), Some("MD"));
    assert_eq!(updated.age, Some(40));

    assert!(find_person(&mut conn, ids[1]).is_none());
    assert_eq!(count_people(&mut conn).unwrap(), 2);
}

#[test]
fn test_insert_then_find_round_trip() {
    let mut conn = create_test_db().unwrap();
    let person = Person::new("Kanye", "West", 45, "Male");

    let mut uow = UnitOfWork::new(&mut conn);
    uow.add(person.clone());
    let id = uow.commit().unwrap().inserted_ids[0];
    drop(uow);

    let found = find_person(&mut conn, id).unwrap();
    assert_eq!(
        found,
        Person {
            id: Some(id),
            ..person
        }
    );
}

#[test]
fn test_failed_commit_leaves_store_untouched() {
    let mut conn = create_test_db().unwrap();
    seed(&mut conn, &[Person::new("Keep", "Me", 30, "Female")]).unwrap();

    let mut uow = UnitOfWork::new(&mut conn);
    uow.add(Person::new("First", "Ok", 20, "Male"));
    uow.remove(Person::with_id(1));
    // FirstName is NOT NULL.
    uow.add(Person {
        first_name: None,
        ..Person::new("", "Broken", 20, "Male")
    });

    let err = uow.commit().unwrap_err();
    match &err {
        MapperError::Commit {
            index,
            table,
            state,
            source,
        } => {
            assert_eq!(*index, 2);
            assert_eq!(table, "Person");
            assert_eq!(*state, EntityState::Created);
            assert!(matches!(**source, MapperError::Execution(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(uow.len(), 3);
    uow.clear();
    drop(uow);

    assert!(!conn.in_transaction());
    assert_eq!(count_people(&mut conn).unwrap(), 1);
    assert!(find_person(&mut conn, 1).is_some());
}

#[test]
fn test_update_with_only_null_fields_is_rejected() {
    let mut conn = create_test_db().unwrap();
    let ids = seed(&mut conn, &[Person::new("Solo", "Row", 50, "Male")]).unwrap();

    let mut uow = UnitOfWork::new(&mut conn);
    uow.update(Person::with_id(ids[0]));
    let err = uow.commit().unwrap_err();
    assert!(matches!(
        err,
        MapperError::Commit { ref source, .. } if matches!(**source, MapperError::EmptyUpdate(_))
    ));
    uow.clear();
    drop(uow);

    assert_eq!(find_person(&mut conn, ids[0]).unwrap().age, Some(50));
}

#[test]
fn test_delete_defaults_to_one_row() {
    let mut conn = create_test_db().unwrap();
    seed(
        &mut conn,
        &[
            Person::new("A", "Same", 1, "Male"),
            Person::new("B", "Same", 2, "Male"),
            Person::new("C", "Same", 3, "Male"),
        ],
    )
    .unwrap();

    let same = Conditions::new().equal("LastName", "Same");
    let bounded = query::delete("Person", &same, Some(query::DEFAULT_DELETE_LIMIT)).unwrap();
    assert_eq!(conn.run(&bounded).unwrap().rows_affected, 1);
    assert_eq!(count_people(&mut conn).unwrap(), 2);

    let unbounded = query::delete("Person", &same, None).unwrap();
    assert_eq!(conn.run(&unbounded).unwrap().rows_affected, 2);
    assert_eq!(count_people(&mut conn).unwrap(), 0);
}

#[test]
fn test_bounded_delete_needs_rowid_table() {
    let mut conn = create_test_db().unwrap();
    conn.execute_batch(
        "CREATE TABLE Setting (Name TEXT PRIMARY KEY, Val TEXT) WITHOUT ROWID;
         INSERT INTO Setting VALUES ('theme', 'dark'), ('lang', 'en');",
    )
    .unwrap();

    let theme = Conditions::new().equal("Name", "theme");
    let bounded = query::delete("Setting", &theme, Some(1)).unwrap();
    assert!(matches!(
        conn.run(&bounded),
        Err(MapperError::Statement(_))
    ));

    let by_key = query::delete("Setting", &theme, None).unwrap();
    assert_eq!(conn.run(&by_key).unwrap().rows_affected, 1);
}

#[test]
fn test_commit_inside_caller_transaction() {
    let mut conn = create_test_db().unwrap();
    conn.begin_transaction().unwrap();

    let mut uow = UnitOfWork::new(&mut conn);
    uow.add(Person::new("Temp", "Row", 9, "Female"));
    uow.commit().unwrap();
    drop(uow);

    // Still the caller's transaction to resolve.
    assert!(conn.in_transaction());
    conn.rollback_transaction().unwrap();
    assert_eq!(count_people(&mut conn).unwrap(), 0);
}

#[test]
fn test_failed_commit_inside_caller_transaction_is_undone() {
    let mut conn = create_test_db().unwrap();
    conn.begin_transaction().unwrap();
    conn.insert_entity(&Person::new("Caller", "Row", 50, "Female"))
        .unwrap();

    let mut uow = UnitOfWork::new(&mut conn);
    uow.add(Person::new("Fetty", "Wap", 21, "Male"));
    uow.add(Person {
        first_name: None,
        ..Person::new("", "Broken", 20, "Male")
    });
    let err = uow.commit().unwrap_err();
    assert!(matches!(err, MapperError::Commit { index: 1, .. }));
    assert_eq!(uow.len(), 2);
    uow.clear();
    drop(uow);

    // The caller's own work survives; none of the commit's does.
    assert!(conn.in_transaction());
    conn.commit_transaction().unwrap();
    assert_eq!(count_people(&mut conn).unwrap(), 1);

    // Retrying the same changes does not duplicate anything.
    conn.begin_transaction().unwrap();
    let mut uow = UnitOfWork::new(&mut conn);
    uow.add(Person::new("Fetty", "Wap", 21, "Male"));
    uow.commit().unwrap();
    drop(uow);
    conn.commit_transaction().unwrap();
    assert_eq!(count_people(&mut conn).unwrap(), 2);
}

#[test]
fn test_immediate_entity_writes() {
    let mut conn = create_test_db().unwrap();
    let outcome = conn
        .insert_entity(&Person::new("No", "One", 24, "Female"))
        .unwrap();
    let id = outcome.last_insert_id;

    conn.update_entity(&Person {
        age: Some(25),
        ..Person::with_id(id)
    })
    .unwrap();
    assert_eq!(find_person(&mut conn, id).unwrap().age, Some(25));

    assert_eq!(
        conn.delete_entity(&Person::with_id(id)).unwrap().rows_affected,
        1
    );
    assert!(find_person(&mut conn, id).is_none());
}

#[test]
fn test_committed_changes_survive_reopen() {
    let (mut conn, temp_file) = create_temp_db().unwrap();
    let mut uow = UnitOfWork::new(&mut conn);
    uow.add(Person::new("Durable", "Write", 33, "Male"));
    let id = uow.commit().unwrap().inserted_ids[0];
    drop(uow);
    drop(conn);

    let config = SqliteConfig::new(temp_file.path().to_string_lossy());
    let mut reopened = Connection::open(&config).unwrap();
    let found = find_person(&mut reopened, id).unwrap();
    assert_eq!(found.first_name.as_deref(), Some("Durable"));
}
