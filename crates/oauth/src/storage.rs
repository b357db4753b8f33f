use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, info};

use crate::{Error, Result, types::Token};

/// Durable home of the single bearer-token record.
pub trait CredentialStore: Send + Sync {
    /// Returns `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<Token>>;
    fn save(&self, token: &Token) -> Result<()>;
}

/// File-based token storage, one JSON record per file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Token>> {
        let path = self.path.display().to_string();
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path, "token file not found");
                return Ok(None);
            },
            Err(e) => return Err(Error::persist(format!("read {path}"), e)),
        };

        let token: Token =
            serde_json::from_str(&data).map_err(|e| Error::persist(format!("parse {path}"), e))?;
        debug!(path = %path, expiry = ?token.expiry, "token loaded");
        Ok(Some(token))
    }

    fn save(&self, token: &Token) -> Result<()> {
        let path = self.path.display().to_string();
        let data = serde_json::to_string_pretty(token)
            .map_err(|e| Error::persist(format!("encode {path}"), e))?;
        write_atomic(&self.path, data.as_bytes())
            .map_err(|e| Error::persist(format!("write {path}"), e))?;
        info!(path = %path, expiry = ?token.expiry, "token saved");
        Ok(())
    }
}

/// Write to a sibling temp file then rename over the target, so readers
/// never observe a half-written record.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, data)?;

    // Set file permissions to 0600 on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp, path)
}

/// In-process store, used for tests and `--dry-run` style wiring.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<Token>>,
    saves: Mutex<usize>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: Token) -> Self {
        Self {
            token: Mutex::new(Some(token)),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Token>> {
        Ok(self.token.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, token: &Token) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("token.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested").join("token.json"));
        let mut token = Token::new("access-1").with_refresh_token("refresh-1");
        token.extra.insert("id_token".into(), "jwt".into());

        store.save(&token).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token.expose_secret(), "access-1");
        assert_eq!(
            loaded.refresh_token.as_ref().map(|s| s.expose_secret().as_str()),
            Some("refresh-1")
        );
        assert_eq!(loaded.extra.get("id_token").map(String::as_str), Some("jwt"));
        assert!(!dir.path().join("nested").join("token.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        FileCredentialStore::new(&path).save(&Token::new("a")).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = FileCredentialStore::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::Persist { .. }));
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&Token::new("a")).unwrap();
        store.save(&Token::new("b")).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(
            store.load().unwrap().unwrap().access_token.expose_secret(),
            "b"
        );
    }
}
