use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::actions::Action;
use super::error::SessionLogError;
use super::reducer::CoreReducer;
use super::root::RootState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub seq: u64,
    pub ts_ms: i64,
    pub action: Action,
}

/// Append-only JSONL log of dispatched actions.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    next_seq: u64,
}

impl SessionLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionLogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existing = load_records(path.as_path())?;
        let next_seq = existing
            .iter()
            .map(|record| record.seq)
            .max()
            .map_or(1, |seq| seq.saturating_add(1));
        Ok(Self { path, next_seq })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, action: &Action) -> Result<u64, SessionLogError> {
        let seq = self.next_seq;
        let record = SessionRecord {
            seq,
            ts_ms: chrono::Utc::now().timestamp_millis(),
            action: action.clone(),
        };
        let line = serde_json::to_string(&record).map_err(SessionLogError::Encode)?;
        append_line(self.path.as_path(), line.as_str())?;
        self.next_seq = self.next_seq.saturating_add(1);
        Ok(seq)
    }

    pub fn load(&self) -> Result<Vec<SessionRecord>, SessionLogError> {
        load_records(self.path.as_path())
    }
}

/// What a replay produced besides the final root.
#[derive(Debug, Clone)]
pub struct Replayed {
    pub root: RootState,
    pub actions: usize,
    pub rolled_back: usize,
    pub diagnostics: usize,
}

/// Reduces `records` in sequence order from the reducer's initial state.
pub fn replay(reducer: &CoreReducer, records: &[SessionRecord]) -> Replayed {
    let mut ordered: Vec<&SessionRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.seq);

    let mut replayed = Replayed {
        root: reducer.initial_state(),
        actions: 0,
        rolled_back: 0,
        diagnostics: 0,
    };
    for record in ordered {
        let reduction = reducer.reduce(&replayed.root, &record.action);
        replayed.actions += 1;
        replayed.diagnostics += reduction.diagnostics.len();
        if reduction.error.is_some() {
            replayed.rolled_back += 1;
        }
        replayed.root = reduction.root;
    }
    tracing::debug!(
        actions = replayed.actions,
        rolled_back = replayed.rolled_back,
        "replayed session log"
    );
    replayed
}

pub fn load_records(path: &Path) -> Result<Vec<SessionRecord>, SessionLogError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str::<SessionRecord>(&line).map_err(|source| {
            SessionLogError::Decode {
                line: idx + 1,
                source,
            }
        })?;
        records.push(record);
    }
    Ok(records)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}
