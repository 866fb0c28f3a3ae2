use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;

use crate::error::EtudeError;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Argon2 PHC string.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Fragment embedded in identity cookies; rotating it revokes them all.
    #[serde(skip_serializing)]
    pub secret: String,
}

/// Fields needed to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub password_hash: String,
    pub secret: String,
}

/// Persistence collaborator behind the identity store.
///
/// Calls are synchronous; timeouts and retries belong to the backend.
pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with [`EtudeError::UserExists`] on a taken name.
    fn create_user(&self, user: NewUser) -> Result<User, EtudeError>;

    fn find_user_by_name(&self, name: &str) -> Result<Option<User>, EtudeError>;

    fn find_user_by_id(&self, id: i64) -> Result<Option<User>, EtudeError>;

    /// Replace the secret fragment of a user.
    fn update_user_secret(&self, id: i64, secret: &str) -> Result<(), EtudeError>;
}

// ── In-Memory Backend ──

/// `HashMap`-backed store. Good for development and testing.
#[derive(Debug)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<i64, User>>,
    next_id: AtomicI64,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.users.read().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> EtudeError {
    EtudeError::Internal("user store lock poisoned".to_string())
}

impl UserStore for InMemoryUserStore {
    fn create_user(&self, user: NewUser) -> Result<User, EtudeError> {
        let mut users = self.users.write().map_err(poisoned)?;
        if users.values().any(|u| u.name == user.name) {
            return Err(EtudeError::UserExists(user.name));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let created = User {
            id,
            name: user.name,
            password_hash: user.password_hash,
            secret: user.secret,
        };
        users.insert(id, created.clone());
        Ok(created)
    }

    fn find_user_by_name(&self, name: &str) -> Result<Option<User>, EtudeError> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.values().find(|u| u.name == name).cloned())
    }

    fn find_user_by_id(&self, id: i64) -> Result<Option<User>, EtudeError> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.get(&id).cloned())
    }

    fn update_user_secret(&self, id: i64, secret: &str) -> Result<(), EtudeError> {
        let mut users = self.users.write().map_err(poisoned)?;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| EtudeError::UserNotFound(id.to_string()))?;
        user.secret = secret.to_string();
        Ok(())
    }
}
