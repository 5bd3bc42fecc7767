use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::session::PersistedSession;
use crate::user::SessionUser;

pub const TOKEN_KEY: &str = "gymapp.session.token";
pub const USER_KEY: &str = "gymapp.session.user";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("session_token_empty")]
    EmptyToken,
    #[error("session_user_serialize_failed:{message}")]
    Serialize { message: String },
    #[error("session_store_io_failed:{message}")]
    Io { message: String },
}

/// Durable home of the internal token and cached user.
///
/// Reads never fail: missing or unreadable entries come back as `None`.
/// Writes are all-or-nothing across the two entries.
pub trait SessionStore: Send + Sync {
    fn read(&self) -> PersistedSession;
    fn write(&self, token: &str, user: &SessionUser) -> Result<(), StoreError>;
    fn clear(&self);

    fn token(&self) -> Option<String> {
        self.read()
            .token
            .filter(|token| !token.trim().is_empty())
    }
}

fn parse_user(raw: &str) -> Option<SessionUser> {
    match serde_json::from_str::<SessionUser>(raw) {
        Ok(user) => Some(user),
        Err(error) => {
            tracing::warn!(error = %error, "discarding unreadable persisted user");
            None
        }
    }
}

fn serialize_user(user: &SessionUser) -> Result<String, StoreError> {
    serde_json::to_string(user).map_err(|error| StoreError::Serialize {
        message: error.to_string(),
    })
}

#[derive(Debug, Default)]
struct MemoryEntries {
    token: Option<String>,
    user: Option<String>,
}

/// In-process store. Both entries live behind one lock, so no reader can
/// observe a half-written pair.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<MemoryEntries>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw entries as they would sit in storage, malformed or not.
    pub fn insert_raw(&self, token: Option<&str>, user: Option<&str>) {
        let mut entries = self.lock();
        entries.token = token.map(ToString::to_string);
        entries.user = user.map(ToString::to_string);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryEntries> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn read(&self) -> PersistedSession {
        let entries = self.lock();
        PersistedSession {
            token: entries.token.clone(),
            user: entries.user.as_deref().and_then(parse_user),
        }
    }

    fn write(&self, token: &str, user: &SessionUser) -> Result<(), StoreError> {
        if token.trim().is_empty() {
            return Err(StoreError::EmptyToken);
        }
        let serialized = serialize_user(user)?;
        let mut entries = self.lock();
        entries.token = Some(token.to_string());
        entries.user = Some(serialized);
        Ok(())
    }

    fn clear(&self) {
        let mut entries = self.lock();
        entries.token = None;
        entries.user = None;
    }
}

/// Directory-backed store holding one file per key.
#[derive(Debug)]
pub struct FileSessionStore {
    dir: PathBuf,
    // Serializes writers inside this process; rename keeps each file whole.
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn staging_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{key}.tmp"))
    }

    fn read_entry(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.entry_path(key)) {
            Ok(raw) => Some(raw),
            Err(error) if error.kind() == io::ErrorKind::NotFound => None,
            Err(error) => {
                tracing::warn!(key, error = %error, "failed to read session entry");
                None
            }
        }
    }

    fn stage(&self, key: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.staging_path(key);
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        Ok(path)
    }

    fn remove_entry(&self, key: &str) {
        for path in [self.entry_path(key), self.staging_path(key)] {
            if let Err(error) = fs::remove_file(&path)
                && error.kind() != io::ErrorKind::NotFound
            {
                tracing::warn!(path = %path.display(), error = %error, "failed to remove session entry");
            }
        }
    }

    fn commit(&self, token: &str, user: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let staged_user = self.stage(USER_KEY, user)?;
        let staged_token = self.stage(TOKEN_KEY, token)?;
        fs::rename(staged_user, self.entry_path(USER_KEY))?;
        fs::rename(staged_token, self.entry_path(TOKEN_KEY))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn read(&self) -> PersistedSession {
        let token = self
            .read_entry(TOKEN_KEY)
            .map(|raw| raw.trim().to_string())
            .filter(|token| !token.is_empty());
        let user = self.read_entry(USER_KEY).as_deref().and_then(parse_user);
        PersistedSession { token, user }
    }

    fn write(&self, token: &str, user: &SessionUser) -> Result<(), StoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(StoreError::EmptyToken);
        }
        let serialized = serialize_user(user)?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Err(error) = self.commit(token, &serialized) {
            // A failed commit may have replaced one entry; drop both.
            self.remove_entry(USER_KEY);
            self.remove_entry(TOKEN_KEY);
            return Err(StoreError::Io {
                message: error.to_string(),
            });
        }
        Ok(())
    }

    fn clear(&self) {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.remove_entry(TOKEN_KEY);
        self.remove_entry(USER_KEY);
    }
}
