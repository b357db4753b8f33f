//! JSON state files with atomic replacement.

use std::{io::Write, path::Path};

use {
    serde::{Serialize, de::DeserializeOwned},
    tempfile::NamedTempFile,
    tokio::fs,
};

use crate::{Error, Result};

/// Read `path`, or `T::default()` when it does not exist.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(Error::persist(format!("read {}", path.display()), e)),
    };
    serde_json::from_slice(&data).map_err(|e| Error::persist(format!("parse {}", path.display()), e))
}

/// Write to a uniquely named sibling temp file and rename it over `path`.
///
/// Concurrent writers never share a temp file, but the last rename wins:
/// callers that need ordered snapshots must serialize their writes.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::persist(format!("encode {}", path.display()), e))?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_file(&path, &json))
        .await
        .map_err(|e| Error::persist("state file writer", e))?
}

fn replace_file(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::persist(format!("create {}", dir.display()), e))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| Error::persist(format!("create temp file in {}", dir.display()), e))?;
    tmp.write_all(data)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| Error::persist(format!("write {}", tmp.path().display()), e))?;
    tmp.persist(path)
        .map_err(|e| Error::persist(format!("replace {}", path.display()), e.error))?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::collections::BTreeMap};

    #[tokio::test]
    async fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let value: BTreeMap<String, i64> =
            read_json_or_default(&dir.path().join("absent.json")).await.unwrap();
        assert!(value.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_leave_a_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut handles = Vec::new();
        for n in 0..16_i64 {
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                let value: BTreeMap<String, i64> = (0..=n).map(|i| (i.to_string(), i)).collect();
                write_json_atomic(&path, &value).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let on_disk: BTreeMap<String, i64> = read_json_or_default(&path).await.unwrap();
        assert!(!on_disk.is_empty());
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
