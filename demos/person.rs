//! Walk through the unit of work with a `Person` entity.
//!
//! ```text
//! cargo run --example person -- sqlite:people.db
//! RUST_LOG=debug cargo run --example person
//! ```

use anyhow::Context;
use rust_sqlite_mapper::{
    Conditions, Connection, FindOptions, Model, Order, Result, Row, SqliteConfig, UnitOfWork,
    Value,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Person {
    id: Option<i64>,
    first_name: Option<String>,
    last_name: Option<String>,
    age: Option<i64>,
    gender: Option<String>,
}

impl Person {
    fn info(&self) -> String {
        format!(
            "#{}: {} {} {} {}",
            self.id.unwrap_or_default(),
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or(""),
            self.age.map(|a| a.to_string()).unwrap_or_default(),
            self.gender.as_deref().unwrap_or(""),
        )
    }
}

impl Model for Person {
    const TABLE: &'static str = "Person";
    const FIELDS: &'static [&'static str] = &["ID", "FirstName", "LastName", "Age", "Gender"];
    const PRIMARY_KEYS: &'static [&'static str] = &["ID"];

    fn column(&self, field: &str) -> Option<Value> {
        match field {
            "ID" => self.id.map(Value::from),
            "FirstName" => self.first_name.clone().map(Value::from),
            "LastName" => self.last_name.clone().map(Value::from),
            "Age" => self.age.map(Value::from),
            "Gender" => self.gender.clone().map(Value::from),
            _ => None,
        }
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get("ID")?,
            first_name: row.get("FirstName")?,
            last_name: row.get("LastName")?,
            age: row.get("Age")?,
            gender: row.get("Gender")?,
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MAPPER_DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite::memory:".to_string());
    let config = SqliteConfig::from_url(&url)?;
    let mut conn = Connection::open(&config).with_context(|| format!("opening {url}"))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS Person (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            FirstName TEXT NOT NULL,
            LastName TEXT,
            Age INTEGER,
            Gender TEXT
        )",
    )?;

    let mut uow = UnitOfWork::new(&mut conn);
    uow.add(Person {
        first_name: Some("Fetty".into()),
        last_name: Some("Wap".into()),
        age: Some(21),
        gender: Some("Male".into()),
        ..Person::default()
    });
    uow.add(Person {
        first_name: Some("Stan".into()),
        last_name: Some("Lee".into()),
        age: Some(95),
        gender: Some("Male".into()),
        ..Person::default()
    });
    let summary = uow.commit().context("saving new people")?;
    let stan = summary.inserted_ids[1];

    uow.update(Person {
        id: Some(stan),
        last_name: Some("MD".into()),
        ..Person::default()
    });
    uow.remove(Person {
        id: Some(summary.inserted_ids[0]),
        ..Person::default()
    });
    uow.commit().context("saving changes")?;
    drop(uow);
    println!("Saved changes successfully");

    let person: Option<Person> =
        conn.find(&Conditions::new().equal("ID", stan), &FindOptions::new())?;
    match person {
        Some(person) => println!("found {}", person.info()),
        None => println!("person #{stan} not found"),
    }

    let everyone: Vec<Person> = conn.find_all(
        &Conditions::new(),
        &FindOptions::new().order_by("ID", Order::Asc),
    )?;
    for person in everyone {
        println!("{}", person.info());
    }
    Ok(())
}
