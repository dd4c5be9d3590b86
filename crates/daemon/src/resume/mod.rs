// Resumption registry: track name → resumption token, persisted as a flat
// JSON object that is read fully and rewritten fully on every update.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

type Table = BTreeMap<String, String>;

pub struct ResumptionRegistry {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl ResumptionRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    /// Token recorded for `name`, if any. A missing or corrupt table reads
    /// as empty.
    pub async fn get(&self, name: &str) -> Option<String> {
        load_table(&self.path).await.remove(name)
    }

    /// Record `token` for `name`, replacing any previous token.
    pub async fn set(&self, name: &str, token: &str) -> io::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut table = load_table(&self.path).await;
        table.insert(name.to_string(), token.to_string());

        let encoded = serde_json::to_vec_pretty(&table).map_err(io::Error::other)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, encoded).await?;
        debug!(track = %name, entries = table.len(), "resumption token recorded");
        Ok(())
    }
}

async fn load_table(path: &Path) -> Table {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Table::new(),
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to read resumption table");
            return Table::new();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(table) => table,
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring corrupt resumption table");
            Table::new()
        }
    }
}
