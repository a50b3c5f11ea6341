mod common;

use common::{count_people, create_temp_db, create_test_db, Person};
use rust_sqlite_mapper::{
    Conditions, Connection, FindOptions, ParamType, Result, SqliteConfig, UnitOfWork, Value,
};

#[tokio::test]
async fn test_basic_operations() {
    test_basic_operations_impl().unwrap();
}

fn test_basic_operations_impl() -> Result<()> {
    // Create an in-memory database
    let mut conn = create_test_db()?;

    // Insert a new person through the low level API
    conn.prepare(
        "INSERT INTO Person (FirstName, LastName, Age, Gender) \
         VALUES (:FirstName, :LastName, :Age, :Gender)",
    )?;
    conn.bind("FirstName", "John")?;
    conn.bind("LastName", "Doe")?;
    conn.bind_as("Age", "30", ParamType::Integer)?;
    conn.bind("Gender", Value::Null)?;
    conn.execute()?;
    let id = conn.last_insert_id();

    // Query it back as a model
    let person: Option<Person> =
        conn.find(&Conditions::new().equal("ID", id), &FindOptions::new())?;
    let person = person.expect("inserted row");
    assert_eq!(person.first_name.as_deref(), Some("John"));
    assert_eq!(person.age, Some(30));
    assert_eq!(person.gender, None);

    // Update the person
    conn.update_entity(&Person {
        age: Some(31),
        ..Person::with_id(id)
    })?;
    let updated: Option<Person> =
        conn.find(&Conditions::new().equal("ID", id), &FindOptions::new())?;
    assert_eq!(updated.and_then(|p| p.age), Some(31));

    // Delete the person
    conn.delete_entity(&Person::with_id(id))?;
    let deleted: Option<Person> =
        conn.find(&Conditions::new().equal("ID", id), &FindOptions::new())?;
    assert!(deleted.is_none());

    Ok(())
}

#[tokio::test]
async fn test_connection_per_worker() {
    let (conn, temp_file) = create_temp_db().unwrap();
    drop(conn);
    let path = temp_file.path().to_string_lossy().into_owned();

    // Connection is blocking and !Sync; each worker opens its own.
    let mut workers = Vec::new();
    for worker in 0..4 {
        let path = path.clone();
        workers.push(tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = Connection::open(&SqliteConfig::new(path))?;
            let mut uow = UnitOfWork::new(&mut conn);
            for n in 0..5 {
                uow.add(Person::new(&format!("w{worker}"), &format!("n{n}"), n, "Male"));
            }
            uow.commit()?;
            Ok(())
        }));
    }
    for worker in workers {
        worker.await.unwrap().unwrap();
    }

    let mut conn = Connection::open(&SqliteConfig::new(path)).unwrap();
    assert_eq!(count_people(&mut conn).unwrap(), 20);
}
