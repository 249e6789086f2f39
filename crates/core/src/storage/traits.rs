//! Storage repository traits
//!
//! Read-side interface used by projections and reports, allowing for
//! different implementations (SQLite, mock, remote document store).
//! Writes to rosters and balances go through the transactional services.

use crate::error::Result;
use crate::models::{ClassId, ClassTemplate, Instructor, InstructorId, User, UserId};
use crate::storage::{ClassFilter, StudioSettings};

/// Class template repository operations
pub trait ClassRepository {
    /// Find a template by ID
    fn find_class(&self, id: ClassId) -> Result<Option<ClassTemplate>>;

    /// Snapshot of templates matching an equality filter
    fn list_classes(&self, filter: ClassFilter) -> Result<Vec<ClassTemplate>>;
}

/// User repository operations
pub trait UserRepository {
    /// Register a user handed over by the identity provider
    fn create_user(&self, user: &User) -> Result<()>;

    /// Find user by ID
    fn find_user(&self, id: &UserId) -> Result<Option<User>>;

    /// List all users
    fn list_users(&self) -> Result<Vec<User>>;

    /// Delete a user
    fn delete_user(&self, id: &UserId) -> Result<()>;
}

/// Instructor repository operations
pub trait InstructorRepository {
    fn create_instructor(&self, instructor: &Instructor) -> Result<()>;

    fn find_instructor(&self, id: &InstructorId) -> Result<Option<Instructor>>;

    fn list_instructors(&self) -> Result<Vec<Instructor>>;

    fn update_instructor(&self, instructor: &Instructor) -> Result<()>;
}

/// Global settings document
pub trait SettingsRepository {
    fn studio_settings(&self) -> Result<StudioSettings>;

    fn save_studio_settings(&self, settings: &StudioSettings) -> Result<()>;
}

/// Combined storage interface
///
/// Provides access to all repository operations.
/// Implementations may be backed by SQLite, mocks, or network.
pub trait Storage: ClassRepository + UserRepository + InstructorRepository + SettingsRepository {}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where
    T: ClassRepository + UserRepository + InstructorRepository + SettingsRepository
{
}
