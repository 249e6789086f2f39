//! SQLite storage layer for the studio core

mod classes;
mod feed;
mod instructors;
mod migrations;
mod parse;
mod settings;
mod traits;
mod users;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::models::{ClassId, ClassTemplate, Instructor, InstructorId, User, UserId};

pub use classes::{BookingCharge, ClassFilter, ClassStore};
pub use feed::{ClassListener, Subscription};
pub use instructors::InstructorStore;
pub use settings::{SettingsStore, StudioSettings};
pub use traits::{
    ClassRepository, InstructorRepository, SettingsRepository, Storage, UserRepository,
};
pub use users::UserStore;

use feed::ClassFeed;

/// How long a connection waits for another writer before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts for a transaction that keeps hitting lock contention
const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

/// Main database handle
pub struct Database {
    conn: Connection,
    feed: ClassFeed,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Configure the connection and bring the schema up to date
    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn,
            feed: ClassFeed::default(),
        })
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        migrations::get_current_version(&self.conn).unwrap_or(0)
    }

    /// Get class template store
    pub fn classes(&self) -> ClassStore<'_> {
        ClassStore::new(&self.conn)
    }

    /// Get user store
    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(&self.conn)
    }

    /// Get instructor store
    pub fn instructors(&self) -> InstructorStore<'_> {
        InstructorStore::new(&self.conn)
    }

    /// Get global settings store
    pub fn settings(&self) -> SettingsStore<'_> {
        SettingsStore::new(&self.conn)
    }

    /// Run `f` atomically against authoritative state
    ///
    /// The write lock is taken when the transaction begins, so every read
    /// inside `f` sees data no other writer can change before commit. An
    /// error from `f` rolls everything back. Lock contention is retried a
    /// bounded number of times and then reported as `TransactionAborted`.
    pub fn transaction<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&Connection) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_transaction(&mut f) {
                Err(e) if e.is_busy() => {
                    if attempt >= MAX_TRANSACTION_ATTEMPTS {
                        warn!(attempt, error = %e, "Transaction gave up on lock contention");
                        return Err(Error::TransactionAborted(e.to_string()));
                    }
                    debug!(attempt, "Transaction hit lock contention, retrying");
                }
                other => return other,
            }
        }
    }

    fn try_transaction<T, F>(&self, f: &mut F) -> Result<T>
    where
        F: FnMut(&Connection) -> Result<T>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Register a listener for class snapshots matching `filter`
    pub fn subscribe<F>(&self, filter: ClassFilter, listener: F) -> Subscription
    where
        F: Fn(&[ClassTemplate]) + Send + Sync + 'static,
    {
        self.feed.subscribe(filter, Arc::new(listener))
    }

    /// Number of attached class listeners
    pub fn subscriber_count(&self) -> usize {
        self.feed.listener_count()
    }

    /// Push fresh snapshots to every class listener
    pub fn publish_classes(&self) -> Result<()> {
        if self.feed.listener_count() == 0 {
            return Ok(());
        }
        self.feed.publish(|filter| self.classes().list(filter))
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl ClassRepository for Database {
    fn find_class(&self, id: ClassId) -> Result<Option<ClassTemplate>> {
        self.classes().find_by_id(id)
    }

    fn list_classes(&self, filter: ClassFilter) -> Result<Vec<ClassTemplate>> {
        self.classes().list(filter)
    }
}

impl UserRepository for Database {
    fn create_user(&self, user: &User) -> Result<()> {
        self.users().create(user)
    }

    fn find_user(&self, id: &UserId) -> Result<Option<User>> {
        self.users().find_by_id(id)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.users().list()
    }

    fn delete_user(&self, id: &UserId) -> Result<()> {
        self.users().delete(id)
    }
}

impl InstructorRepository for Database {
    fn create_instructor(&self, instructor: &Instructor) -> Result<()> {
        self.instructors().create(instructor)
    }

    fn find_instructor(&self, id: &InstructorId) -> Result<Option<Instructor>> {
        self.instructors().find_by_id(id)
    }

    fn list_instructors(&self) -> Result<Vec<Instructor>> {
        self.instructors().list()
    }

    fn update_instructor(&self, instructor: &Instructor) -> Result<()> {
        self.instructors().update(instructor)
    }
}

impl SettingsRepository for Database {
    fn studio_settings(&self) -> Result<StudioSettings> {
        self.settings().get_or_default()
    }

    fn save_studio_settings(&self, settings: &StudioSettings) -> Result<()> {
        self.settings().save(settings)
    }
}
