use std::path::{Path, PathBuf};

use llmprobe_core::{slug, Result, RunRecord};
use tracing::{info, instrument, warn};

/// Run records on disk, one pretty-printed JSON file per backend session.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses `dir` when given, else [`default_root`].
    pub fn open(dir: Option<&Path>) -> Self {
        Self::new(dir.map(Path::to_path_buf).unwrap_or_else(default_root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[instrument(skip(self, record), fields(backend = record.backend()))]
    pub fn save(&self, record: &RunRecord) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;

        let filename = format!(
            "eval_{}_{}.json",
            slug(record.backend()),
            record.timestamp().format("%Y%m%d_%H%M%S_%3f")
        );
        let path = self.root.join(filename);

        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, json)?;

        info!("Saved results to {:?}", path);
        Ok(path)
    }

    /// Record files for `backend`, oldest first.
    pub fn list(&self, backend: &str) -> Result<Vec<PathBuf>> {
        let prefix = format!("eval_{}_", slug(backend));

        let dir = match std::fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in dir {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let stamp = name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(".json"));
            if stamp.is_some_and(is_stamp) {
                paths.push(path);
            }
        }

        paths.sort();
        Ok(paths)
    }

    /// Newest readable record for `backend`. Unreadable files, and files
    /// written for another backend whose name has the same slug, are skipped
    /// in favour of the next older one.
    #[instrument(skip(self))]
    pub fn load_latest(&self, backend: &str) -> Result<Option<RunRecord>> {
        for path in self.list(backend)?.into_iter().rev() {
            match load(&path) {
                Ok(record) if record.backend() == backend => return Ok(Some(record)),
                Ok(record) => warn!(
                    "Skipping record {:?}: written for backend '{}'",
                    path,
                    record.backend()
                ),
                Err(e) => warn!("Skipping unreadable record {:?}: {}", path, e),
            }
        }
        Ok(None)
    }
}

pub fn load(path: &Path) -> Result<RunRecord> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn is_stamp(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c == '_')
}

pub fn default_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("llmprobe").join("results"))
        .unwrap_or_else(|| PathBuf::from("results"))
}
