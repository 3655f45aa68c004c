use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{dummy_password_hash, hash_password, verify_password, PasswordHashError, Role};
use crate::validation::{is_valid_email, validate_name, validate_password, validate_siape};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub siape: u32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub siape: u32,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub offset: usize,
    pub length: usize,
    pub records: Vec<User>,
    pub total_records: usize,
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,
    #[error("siape {0} is already registered")]
    SiapeTaken(u32),
    #[error("invalid siape or password")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Password(#[from] PasswordHashError),
}

#[derive(Debug, Default)]
struct Records {
    users: Vec<User>,
    by_id: HashMap<Uuid, usize>,
    by_siape: HashMap<u32, usize>,
}

impl Records {
    fn get(&self, id: &Uuid) -> Option<&User> {
        self.by_id.get(id).map(|&idx| &self.users[idx])
    }

    fn remove(&mut self, id: &Uuid) -> Option<User> {
        let idx = self.by_id.remove(id)?;
        let removed = self.users.swap_remove(idx);
        let siape_idx = self.by_siape.remove(&removed.siape);
        debug_assert_eq!(siape_idx, Some(idx), "siape index out of sync");

        if let Some(moved) = self.users.get(idx) {
            self.by_id.insert(moved.id, idx);
            self.by_siape.insert(moved.siape, idx);
        }
        Some(removed)
    }
}

/// Accounts of the department staff, indexed by id and by SIAPE number.
#[derive(Debug, Default)]
pub struct UserRepository {
    records: RwLock<Records>,
}

impl UserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page of users in storage order. Out-of-range windows yield an empty page.
    pub async fn list(&self, offset: usize, limit: usize) -> UserPage {
        let records = self.records.read().await;
        let total = records.users.len();
        let lo = offset.min(total);
        let hi = offset.saturating_add(limit).min(total);

        let page: Vec<User> = records.users[lo..hi].to_vec();
        UserPage {
            offset: lo,
            length: page.len(),
            records: page,
            total_records: total,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<User, UserError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(UserError::NotFound)
    }

    pub async fn get_by_siape(&self, siape: u32) -> Result<User, UserError> {
        let records = self.records.read().await;
        records
            .by_siape
            .get(&siape)
            .map(|&idx| records.users[idx].clone())
            .ok_or(UserError::NotFound)
    }

    pub async fn create(&self, new_user: NewUser) -> Result<User, UserError> {
        validate_siape(new_user.siape).map_err(validation)?;
        validate_new_fields(
            Some(&new_user.name),
            Some(&new_user.email),
            Some(&new_user.password),
            Some(new_user.role),
        )?;

        // Hash outside the lock, argon2 is deliberately slow.
        let password_hash = hash_password(&new_user.password)?;
        let user = User {
            id: Uuid::new_v4(),
            siape: new_user.siape,
            name: new_user.name.trim().to_string(),
            email: new_user.email,
            password_hash,
            role: new_user.role,
        };

        let mut records = self.records.write().await;
        if records.by_siape.contains_key(&user.siape) {
            return Err(UserError::SiapeTaken(user.siape));
        }
        let idx = records.users.len();
        records.by_id.insert(user.id, idx);
        records.by_siape.insert(user.siape, idx);
        records.users.push(user.clone());
        Ok(user)
    }

    pub async fn patch(&self, id: Uuid, patch: UserPatch) -> Result<User, UserError> {
        validate_new_fields(
            patch.name.as_deref(),
            patch.email.as_deref(),
            patch.password.as_deref(),
            patch.role,
        )?;
        let password_hash = patch.password.as_deref().map(hash_password).transpose()?;

        let mut records = self.records.write().await;
        let idx = *records.by_id.get(&id).ok_or(UserError::NotFound)?;
        let user = &mut records.users[idx];
        if let Some(name) = patch.name {
            user.name = name.trim().to_string();
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        Ok(user.clone())
    }

    /// Idempotent: deleting an unknown id succeeds.
    pub async fn delete(&self, id: Uuid) {
        self.records.write().await.remove(&id);
    }

    /// Checks a SIAPE/password pair. Unknown accounts and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn authenticate(&self, siape: u32, password: &str) -> Result<User, UserError> {
        let user = self.get_by_siape(siape).await.ok();
        let hash = user
            .as_ref()
            .map_or(dummy_password_hash(), |u| u.password_hash.as_str());

        let matches = verify_password(password, hash)?;
        match user {
            Some(user) if matches => Ok(user),
            _ => Err(UserError::InvalidCredentials),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Demo staff for local development, one account per role.
    pub async fn seed_demo(&self, password: &str) -> Result<(), UserError> {
        let demo = [
            (1, "Chefe do Departamento", "chefe@example.edu.br", Role::Chief),
            (2, "Técnica Promovida", "promovida@example.edu.br", Role::Promoted),
            (3, "Técnico Administrativo", "tecnico@example.edu.br", Role::Admin),
            (4, "Docente Exemplo", "docente@example.edu.br", Role::User),
        ];

        for (siape, name, email, role) in demo {
            let created = self
                .create(NewUser {
                    siape,
                    name: name.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                    role,
                })
                .await;
            match created {
                Ok(user) => tracing::info!(siape, role = %user.role, "Seeded demo user"),
                Err(UserError::SiapeTaken(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn validation(message: &str) -> UserError {
    UserError::Validation(message.to_string())
}

/// Collects every problem with the supplied fields into one error.
fn validate_new_fields(
    name: Option<&str>,
    email: Option<&str>,
    password: Option<&str>,
    role: Option<Role>,
) -> Result<(), UserError> {
    let mut problems = Vec::new();
    if let Some(Err(e)) = name.map(validate_name) {
        problems.push(e.to_string());
    }
    if email.is_some_and(|e| !is_valid_email(e)) {
        problems.push("email is not a valid address".to_string());
    }
    if let Some(Err(e)) = password.map(validate_password) {
        problems.push(e.to_string());
    }
    if role.is_some_and(|r| !r.is_valid()) {
        problems.push("role must be an account role".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(UserError::Validation(problems.join("; ")))
    }
}
