use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::policy::Transition;
use super::types::{AccessStatus, TrackingEvent, VisitorDetail, VisitorIdentity};
use crate::client::emitter::TrackingPayload;
use crate::time::now_ms;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("visitor not found: {0}")]
    NotFound(String),
    #[error("invalid event: {0}")]
    InvalidEvent(&'static str),
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot format error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("registry lock poisoned")]
    Poisoned,
}

/// Visitors and the pk counter go to the rewritten snapshot; events live in
/// an append-only JSON-lines log next to it.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryState {
    next_id: u64,
    visitors: Vec<VisitorIdentity>,
    #[serde(skip)]
    events: Vec<TrackingEvent>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl RegistryState {
    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, visitor) in self.visitors.iter().enumerate() {
            self.index.insert(visitor.visitor_id.clone(), i);
        }
        let max_id = self.visitors.iter().map(|v| v.id).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id + 1).max(1);
    }

    /// `key` is a visitor_id first, then a numeric primary key.
    fn position(&self, key: &str) -> Option<usize> {
        if let Some(&pos) = self.index.get(key) {
            return Some(pos);
        }
        let pk = key.parse::<u64>().ok()?;
        self.visitors.iter().position(|v| v.id == pk)
    }
}

/// On-disk layout: `registry.json` plus `registry.events.jsonl`.
struct Storage {
    snapshot: PathBuf,
    event_log: PathBuf,
}

impl Storage {
    fn new(snapshot: PathBuf) -> Self {
        let event_log = snapshot.with_extension("events.jsonl");
        Self { snapshot, event_log }
    }
}

/// Undo record for a mutation that failed to persist.
enum Undo {
    Created,
    Updated(VisitorIdentity),
}

/// Canonical store of visitor records and their event log.
///
/// Mutations are atomic per record: they take the write lock, apply, persist
/// (when a snapshot path is configured) and revert if persisting fails.
/// Ingest cost on disk depends on the number of visitors, never on the
/// length of the event history.
pub struct VisitorRegistry {
    state: RwLock<RegistryState>,
    storage: Option<Storage>,
}

impl VisitorRegistry {
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                next_id: 1,
                ..RegistryState::default()
            }),
            storage: None,
        }
    }

    /// Loads the snapshot at `path` and its event log if they exist. Later
    /// mutations rewrite the snapshot and append to the log.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let storage = Storage::new(path.into());
        let mut state = if storage.snapshot.exists() {
            let content = fs::read_to_string(&storage.snapshot)?;
            serde_json::from_str::<RegistryState>(&content)?
        } else {
            RegistryState::default()
        };
        state.rebuild_index();
        if storage.event_log.exists() {
            state.events = load_event_log(&storage.event_log, &state.index)?;
        }
        info!(
            "registry loaded from {}: {} visitors, {} events",
            storage.snapshot.display(),
            state.visitors.len(),
            state.events.len()
        );
        Ok(Self {
            state: RwLock::new(state),
            storage: Some(storage),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>, RegistryError> {
        self.state.read().map_err(|_| RegistryError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>, RegistryError> {
        self.state.write().map_err(|_| RegistryError::Poisoned)
    }

    fn persist(&self, state: &RegistryState) -> Result<(), RegistryError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        save_snapshot(&storage.snapshot, state)
    }

    /// Snapshot first, then the log line. A snapshot without the line only
    /// over-counts `event_count`; a line without its visitor is skipped on load.
    fn persist_ingest(&self, state: &RegistryState, event: &TrackingEvent) -> Result<(), RegistryError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        save_snapshot(&storage.snapshot, state)?;
        append_event(&storage.event_log, event)
    }

    /// Records one event. Creates the visitor with `allow` on first sight,
    /// otherwise refreshes `last_seen`, `ip_address` and `event_count`.
    /// Never touches `access_status` of an existing visitor.
    pub fn ingest(
        &self,
        payload: TrackingPayload,
        ip_address: Option<String>,
    ) -> Result<TrackingEvent, RegistryError> {
        if payload.visitor_id.trim().is_empty() {
            return Err(RegistryError::InvalidEvent("visitor_id is required"));
        }
        if payload.event_type.trim().is_empty() {
            return Err(RegistryError::InvalidEvent("event_type is required"));
        }

        let now = now_ms();
        let event = TrackingEvent {
            visitor_id: payload.visitor_id,
            event_type: payload.event_type,
            url: payload.url,
            target_resource: payload.target_resource,
            metadata: payload.metadata,
            encoded_context: payload.encoded_info,
            timestamp: now,
        };

        let mut state = self.write()?;
        let undo = match state.index.get(&event.visitor_id).copied() {
            Some(pos) => {
                let visitor = &mut state.visitors[pos];
                let before = visitor.clone();
                visitor.last_seen = now;
                if ip_address.is_some() {
                    visitor.ip_address = ip_address;
                }
                visitor.event_count += 1;
                Undo::Updated(before)
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                state.visitors.push(VisitorIdentity {
                    id,
                    visitor_id: event.visitor_id.clone(),
                    ip_address,
                    first_seen: now,
                    last_seen: now,
                    access_status: AccessStatus::default(),
                    event_count: 1,
                });
                let pos = state.visitors.len() - 1;
                state.index.insert(event.visitor_id.clone(), pos);
                info!("new visitor {} (#{})", event.visitor_id, id);
                Undo::Created
            }
        };
        state.events.push(event.clone());

        if let Err(e) = self.persist_ingest(&state, &event) {
            warn!("ingest of {} not persisted, reverting: {}", event.visitor_id, e);
            state.events.pop();
            match undo {
                Undo::Created => {
                    state.visitors.pop();
                    state.index.remove(&event.visitor_id);
                    state.next_id -= 1;
                }
                Undo::Updated(before) => {
                    if let Some(pos) = state.index.get(&before.visitor_id).copied() {
                        state.visitors[pos] = before;
                    }
                }
            }
            // The snapshot may already contain the failed ingest
            if let Err(resave) = self.persist(&state) {
                debug!("reverted snapshot not rewritten: {}", resave);
            }
            return Err(e);
        }

        debug!("ingested {} for {}", event.event_type, event.visitor_id);
        Ok(event)
    }

    /// All visitors, most recently seen first.
    pub fn list(&self) -> Result<Vec<VisitorIdentity>, RegistryError> {
        let state = self.read()?;
        let mut visitors = state.visitors.clone();
        visitors.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(b.id.cmp(&a.id)));
        Ok(visitors)
    }

    pub fn get(&self, key: &str) -> Result<VisitorIdentity, RegistryError> {
        let state = self.read()?;
        state
            .position(key)
            .map(|pos| state.visitors[pos].clone())
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    /// The record plus up to `limit` of its newest events, newest first.
    pub fn detail(&self, key: &str, limit: usize) -> Result<VisitorDetail, RegistryError> {
        let state = self.read()?;
        let pos = state
            .position(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        let visitor = state.visitors[pos].clone();
        let recent_events = state
            .events
            .iter()
            .rev()
            .filter(|e| e.visitor_id == visitor.visitor_id)
            .take(limit)
            .cloned()
            .collect();
        Ok(VisitorDetail {
            visitor,
            recent_events,
        })
    }

    /// Events for one visitor in ingestion order.
    pub fn events_for(&self, visitor_id: &str) -> Result<Vec<TrackingEvent>, RegistryError> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.visitor_id == visitor_id)
            .cloned()
            .collect())
    }

    /// Operator transition. Only `access_status` changes; setting the current
    /// value succeeds without writing anything.
    pub fn set_access_status(
        &self,
        key: &str,
        target: AccessStatus,
    ) -> Result<(VisitorIdentity, Transition), RegistryError> {
        let mut state = self.write()?;
        let pos = state
            .position(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;

        let transition = state.visitors[pos].access_status.transition(target);
        let Transition::Changed { from, to } = transition else {
            return Ok((state.visitors[pos].clone(), transition));
        };

        state.visitors[pos].access_status = to;
        if let Err(e) = self.persist(&state) {
            warn!("status change for {} not persisted, reverting: {}", key, e);
            state.visitors[pos].access_status = from;
            return Err(e);
        }

        info!(
            "visitor {} access status {} -> {}",
            state.visitors[pos].visitor_id, from, to
        );
        Ok((state.visitors[pos].clone(), transition))
    }

    pub fn visitor_count(&self) -> usize {
        self.read().map(|s| s.visitors.len()).unwrap_or(0)
    }

    pub fn event_count(&self) -> usize {
        self.read().map(|s| s.events.len()).unwrap_or(0)
    }
}

/// Write-then-rename so a crash never leaves a half-written snapshot.
fn save_snapshot(path: &Path, state: &RegistryState) -> Result<(), RegistryError> {
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn append_event(path: &Path, event: &TrackingEvent) -> Result<(), RegistryError> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Reads the event log in ingestion order. A torn trailing line and events
/// whose visitor never reached the snapshot are skipped.
fn load_event_log(
    path: &Path,
    known: &HashMap<String, usize>,
) -> Result<Vec<TrackingEvent>, RegistryError> {
    let content = fs::read_to_string(path)?;
    let mut events = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TrackingEvent>(line) {
            Ok(event) if known.contains_key(&event.visitor_id) => events.push(event),
            Ok(event) => warn!("event log line {}: unknown visitor {}", n + 1, event.visitor_id),
            Err(e) => warn!("event log line {} unreadable: {}", n + 1, e),
        }
    }
    Ok(events)
}
