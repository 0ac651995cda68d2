use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create a user; `Conflict` if the username or email is already taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
}

#[async_trait]
pub trait FileRepo: Send + Sync {
    async fn create_file(&self, new: NewStoredFile) -> RepoResult<StoredFile>;
    async fn list_files(&self) -> RepoResult<Vec<StoredFile>>;
    async fn find_file_by_key(&self, storage_key: &str) -> RepoResult<Option<StoredFile>>;
}

pub trait Repo: UserRepo + FileRepo {}

impl<T> Repo for T where T: UserRepo + FileRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        files: HashMap<Id, StoredFile>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("FILEDROP_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            // username and email are each unique
            if s.users
                .values()
                .any(|u| u.username == new.username || u.email == new.email)
            {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                username: new.username,
                email: new.email,
                password_hash: new.password_hash,
                role: new.role,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(user)
        }

        async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.username == username).cloned())
        }
    }

    #[async_trait]
    impl FileRepo for InMemRepo {
        async fn create_file(&self, new: NewStoredFile) -> RepoResult<StoredFile> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let file = StoredFile {
                id,
                display_name: new.display_name,
                storage_key: new.storage_key,
                extension: new.extension,
                created_at: Utc::now(),
            };
            s.files.insert(id, file.clone());
            drop(s);
            self.persist();
            Ok(file)
        }

        async fn list_files(&self) -> RepoResult<Vec<StoredFile>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.files.values().cloned().collect();
            v.sort_by_key(|f| f.id);
            Ok(v)
        }

        async fn find_file_by_key(&self, storage_key: &str) -> RepoResult<Option<StoredFile>> {
            let s = self.state.read().unwrap();
            Ok(s.files.values().find(|f| f.storage_key == storage_key).cloned())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::auth::Role;
    use chrono::{DateTime, Utc};
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    #[derive(sqlx::FromRow)]
    struct UserRow {
        id: i64,
        username: String,
        email: String,
        password_hash: String,
        role: String,
        created_at: DateTime<Utc>,
    }

    impl UserRow {
        fn into_user(self) -> RepoResult<User> {
            let role = Role::parse(&self.role)
                .ok_or_else(|| RepoError::Internal(format!("unknown role '{}' in users row {}", self.role, self.id)))?;
            Ok(User {
                id: self.id,
                username: self.username,
                email: self.email,
                password_hash: self.password_hash,
                role,
                created_at: self.created_at,
            })
        }
    }

    #[derive(sqlx::FromRow)]
    struct FileRow {
        id: i64,
        display_name: String,
        storage_key: String,
        extension: String,
        created_at: DateTime<Utc>,
    }

    impl From<FileRow> for StoredFile {
        fn from(r: FileRow) -> Self {
            StoredFile {
                id: r.id,
                display_name: r.display_name,
                storage_key: r.storage_key,
                extension: r.extension,
                created_at: r.created_at,
            }
        }
    }

    fn map_db_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            // 23505 = unique_violation
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => RepoError::Conflict,
            _ => RepoError::Internal(e.to_string()),
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let row = sqlx::query_as::<_, UserRow>(
                "INSERT INTO users (username, email, password_hash, role) VALUES ($1,$2,$3,$4) \
                 RETURNING id, username, email, password_hash, role, created_at",
            )
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
            row.into_user()
        }

        async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
            let row = sqlx::query_as::<_, UserRow>(
                "SELECT id, username, email, password_hash, role, created_at FROM users WHERE username = $1",
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
            row.map(UserRow::into_user).transpose()
        }
    }

    #[async_trait]
    impl FileRepo for PgRepo {
        async fn create_file(&self, new: NewStoredFile) -> RepoResult<StoredFile> {
            let row = sqlx::query_as::<_, FileRow>(
                "INSERT INTO files (display_name, storage_key, extension) VALUES ($1,$2,$3) \
                 RETURNING id, display_name, storage_key, extension, created_at",
            )
            .bind(&new.display_name)
            .bind(&new.storage_key)
            .bind(&new.extension)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(row.into())
        }

        async fn list_files(&self) -> RepoResult<Vec<StoredFile>> {
            let rows = sqlx::query_as::<_, FileRow>(
                "SELECT id, display_name, storage_key, extension, created_at FROM files ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(rows.into_iter().map(StoredFile::from).collect())
        }

        async fn find_file_by_key(&self, storage_key: &str) -> RepoResult<Option<StoredFile>> {
            let row = sqlx::query_as::<_, FileRow>(
                "SELECT id, display_name, storage_key, extension, created_at FROM files WHERE storage_key = $1",
            )
            .bind(storage_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(row.map(StoredFile::from))
        }
    }
}
