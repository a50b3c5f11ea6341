//! SQLite data mapper with a unit of work.
//!
//! # Intention
//!
//! - Turn typed domain objects into parameterized SQL statements.
//! - Track pending inserts, updates and deletes and commit them as one
//!   transactional batch.
//!
//! # Architectural Boundaries
//!
//! - Only mapping and SQLite code belongs here.
//! - No schema migrations, joins or connection pooling.
//! - Domain entities live with the application; this crate only defines the
//!   [`Entity`] / [`Model`] contract they implement.
//!
//! # Example
//!
//! ```ignore
//! let mut conn = Connection::open(&SqliteConfig::new("app.db"))?;
//!
//! let mut uow = UnitOfWork::new(&mut conn);
//! uow.add(Person::new("Fetty", "Wap", 21, "Male"));
//! uow.remove(Person::with_id(3));
//! uow.commit()?;
//! drop(uow);
//!
//! let found: Option<Person> =
//!     conn.find(&Conditions::new().equal("ID", 15), &FindOptions::new())?;
//! ```

pub mod entity;
pub mod error;
pub mod executor;
pub mod mapper;
pub mod query;
pub mod sqlite;
pub mod unit_of_work;
pub mod value;

pub use entity::{Entity, EntityState, Model, TrackedEntity};
pub use error::{MapperError, Result};
pub use executor::{Execution, Executor};
pub use mapper::FindOptions;
pub use query::{Conditions, Order, QueryOperator, SqlQuery};
pub use sqlite::{Connection, SqliteConfig};
pub use unit_of_work::{CommitSummary, UnitOfWork};
pub use value::{FromValue, ParamType, Row, Value};
