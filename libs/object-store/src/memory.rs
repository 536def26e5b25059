use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::RemoteError;
use crate::store::{RemoteConnector, RemoteStore};
use crate::types::{FileOrder, FolderQuery, RemoteFile, RemoteFolder};
use crate::ROOT_PARENT_ID;

#[derive(Debug, Clone)]
struct StoredFolder {
    id: String,
    name: String,
    parent: String,
}

#[derive(Debug, Clone)]
struct StoredFile {
    id: String,
    name: String,
    parent: String,
    created_time: DateTime<Utc>,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemoryState {
    folders: Vec<StoredFolder>,
    files: Vec<StoredFile>,
    next_id: u64,
    last_created: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    transient_failures_left: u32,
    failing_upload_prefixes: Vec<String>,
    failing_deletes: bool,
}

#[derive(Debug, Default)]
struct CallCounters {
    create_folder: u32,
    upload: u32,
    delete: u32,
}

/// In-memory remote drive with fault injection.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<MemoryState>,
    faults: Mutex<Faults>,
    calls: Mutex<CallCounters>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a transient error until cleared.
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.faults).unreachable = unreachable;
    }

    /// The next `count` calls fail with a transient error.
    pub fn fail_next_calls(&self, count: u32) {
        lock(&self.faults).transient_failures_left = count;
    }

    /// Uploads whose file name starts with `prefix` are rejected.
    pub fn fail_uploads_with_prefix(&self, prefix: impl Into<String>) {
        lock(&self.faults).failing_upload_prefixes.push(prefix.into());
    }

    pub fn set_failing_deletes(&self, failing: bool) {
        lock(&self.faults).failing_deletes = failing;
    }

    pub fn create_folder_calls(&self) -> u32 {
        lock(&self.calls).create_folder
    }

    pub fn upload_calls(&self) -> u32 {
        lock(&self.calls).upload
    }

    pub fn delete_calls(&self) -> u32 {
        lock(&self.calls).delete
    }

    pub fn folders_named(&self, name: &str) -> Vec<RemoteFolder> {
        lock(&self.state)
            .folders
            .iter()
            .filter(|folder| folder.name == name)
            .map(|folder| RemoteFolder {
                id: folder.id.clone(),
                name: folder.name.clone(),
            })
            .collect()
    }

    /// Files under `parent_id`, newest first.
    pub fn files_in(&self, parent_id: &str) -> Vec<RemoteFile> {
        let state = lock(&self.state);
        sorted_files(&state, parent_id, FileOrder::CreatedTimeDesc)
    }

    pub fn file_contents(&self, file_id: &str) -> Option<Vec<u8>> {
        lock(&self.state)
            .files
            .iter()
            .find(|file| file.id == file_id)
            .map(|file| file.bytes.clone())
    }

    /// Seed a file with an explicit creation time.
    pub fn insert_file_at(
        &self,
        name: &str,
        parent_id: &str,
        bytes: Vec<u8>,
        created_time: DateTime<Utc>,
    ) -> String {
        let mut state = lock(&self.state);
        let id = next_id(&mut state, "file");
        state.files.push(StoredFile {
            id: id.clone(),
            name: name.to_string(),
            parent: parent_id.to_string(),
            created_time,
            bytes,
        });
        id
    }

    fn check_reachable(&self) -> Result<(), RemoteError> {
        let mut faults = lock(&self.faults);
        if faults.unreachable {
            return Err(RemoteError::Transient("remote store unreachable".into()));
        }
        if faults.transient_failures_left > 0 {
            faults.transient_failures_left -= 1;
            return Err(RemoteError::Transient("injected transient failure".into()));
        }
        Ok(())
    }
}

fn next_id(state: &mut MemoryState, kind: &str) -> String {
    state.next_id += 1;
    format!("{kind}-{:04}", state.next_id)
}

/// Strictly increasing creation stamps so ordering is deterministic.
fn next_created_time(state: &mut MemoryState) -> DateTime<Utc> {
    let now = Utc::now();
    let stamp = match state.last_created {
        Some(last) if now <= last => last + Duration::milliseconds(1),
        _ => now,
    };
    state.last_created = Some(stamp);
    stamp
}

fn sorted_files(state: &MemoryState, parent_id: &str, order: FileOrder) -> Vec<RemoteFile> {
    let mut files: Vec<RemoteFile> = state
        .files
        .iter()
        .filter(|file| file.parent == parent_id)
        .map(|file| RemoteFile {
            id: file.id.clone(),
            name: file.name.clone(),
            created_time: file.created_time,
        })
        .collect();
    match order {
        FileOrder::CreatedTimeDesc => files.sort_by(|a, b| b.created_time.cmp(&a.created_time)),
    }
    files
}

#[async_trait]
impl RemoteStore for MemoryObjectStore {
    async fn list_folders(&self, query: &FolderQuery) -> Result<Vec<RemoteFolder>, RemoteError> {
        self.check_reachable()?;
        let state = lock(&self.state);
        Ok(state
            .folders
            .iter()
            .filter(|folder| folder.name == query.name && folder.parent == query.parent())
            .map(|folder| RemoteFolder {
                id: folder.id.clone(),
                name: folder.name.clone(),
            })
            .collect())
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        lock(&self.calls).create_folder += 1;
        self.check_reachable()?;
        let mut state = lock(&self.state);
        let id = next_id(&mut state, "folder");
        state.folders.push(StoredFolder {
            id: id.clone(),
            name: name.to_string(),
            parent: parent_id.unwrap_or(ROOT_PARENT_ID).to_string(),
        });
        Ok(id)
    }

    async fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String, RemoteError> {
        lock(&self.calls).upload += 1;
        self.check_reachable()?;
        if lock(&self.faults)
            .failing_upload_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
        {
            return Err(RemoteError::Rejected(format!("upload of {name} refused")));
        }

        let mut state = lock(&self.state);
        if !state.folders.iter().any(|folder| folder.id == parent_id) {
            return Err(RemoteError::NotFound(format!("folder {parent_id}")));
        }
        let id = next_id(&mut state, "file");
        let created_time = next_created_time(&mut state);
        state.files.push(StoredFile {
            id: id.clone(),
            name: name.to_string(),
            parent: parent_id.to_string(),
            created_time,
            bytes,
        });
        Ok(id)
    }

    async fn list_files(
        &self,
        parent_id: &str,
        order: FileOrder,
    ) -> Result<Vec<RemoteFile>, RemoteError> {
        self.check_reachable()?;
        let state = lock(&self.state);
        Ok(sorted_files(&state, parent_id, order))
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        lock(&self.calls).delete += 1;
        self.check_reachable()?;
        if lock(&self.faults).failing_deletes {
            return Err(RemoteError::Rejected(format!("delete of {file_id} refused")));
        }
        lock(&self.state).files.retain(|file| file.id != file_id);
        Ok(())
    }
}

/// Hands out a shared [`MemoryObjectStore`], optionally checking the token.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    store: Arc<MemoryObjectStore>,
    expected_tokens: HashMap<String, String>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryObjectStore>) -> Self {
        Self {
            store,
            expected_tokens: HashMap::new(),
        }
    }

    /// Only `token` is accepted for `tenant_id` from now on.
    pub fn expect_token(mut self, tenant_id: &str, token: &str) -> Self {
        self.expected_tokens
            .insert(tenant_id.to_string(), token.to_string());
        self
    }
}

#[async_trait]
impl RemoteConnector for MemoryConnector {
    async fn connect(
        &self,
        tenant_id: &str,
        refresh_token: &str,
    ) -> Result<Arc<dyn RemoteStore>, RemoteError> {
        if refresh_token.trim().is_empty() {
            return Err(RemoteError::Auth("empty refresh token".into()));
        }
        if let Some(expected) = self.expected_tokens.get(tenant_id) {
            if expected != refresh_token {
                return Err(RemoteError::Auth("invalid_grant".into()));
            }
        }
        Ok(self.store.clone() as Arc<dyn RemoteStore>)
    }
}
