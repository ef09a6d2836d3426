//! In-memory remote table (primarily for tests and offline runs)

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{FieldFilter, Fields, GatewayError, GatewayResult, RemoteRecord, RemoteTable};

/// Kind of request made against a [`MemoryTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<RemoteRecord>>,
    next_id: u64,
    unavailable: bool,
    pending_failures: HashMap<Operation, usize>,
    calls: Vec<(Operation, String)>,
}

/// [`RemoteTable`] kept in process memory, with failure injection.
///
/// Rows keep insertion order, like a table listed by creation time.
#[derive(Debug, Default)]
pub struct MemoryTable {
    state: Mutex<MemoryState>,
}

impl MemoryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> GatewayResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| GatewayError::InvalidPayload("memory table lock poisoned".to_string()))
    }

    /// Insert a row directly, bypassing failure injection. Returns its id.
    pub fn seed(&self, table: &str, fields: Fields) -> String {
        let Ok(mut state) = self.state() else {
            return String::new();
        };
        state.insert(table, fields).id
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, table: &str) -> Vec<RemoteRecord> {
        self.state()
            .map(|state| state.tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Make every request fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state() {
            state.unavailable = unavailable;
        }
    }

    /// Fail the next `count` requests of kind `operation`.
    pub fn fail_next(&self, operation: Operation, count: usize) {
        if let Ok(mut state) = self.state() {
            *state.pending_failures.entry(operation).or_default() += count;
        }
    }

    /// Number of requests of kind `operation` made so far.
    pub fn call_count(&self, operation: Operation) -> usize {
        self.state()
            .map(|state| state.calls.iter().filter(|(op, _)| *op == operation).count())
            .unwrap_or_default()
    }

    /// Requests made so far, in order, with the table they targeted.
    pub fn calls(&self) -> Vec<(Operation, String)> {
        self.state()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    fn begin(&self, operation: Operation, table: &str) -> GatewayResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.state()?;
        state.calls.push((operation, table.to_string()));
        if state.unavailable {
            return Err(unavailable());
        }
        if let Some(remaining) = state.pending_failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(unavailable());
            }
        }
        Ok(state)
    }
}

impl MemoryState {
    fn insert(&mut self, table: &str, fields: Fields) -> RemoteRecord {
        self.next_id += 1;
        let record = RemoteRecord {
            id: format!("rec{:06}", self.next_id),
            fields,
        };
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    fn find_mut(&mut self, table: &str, id: &str) -> GatewayResult<&mut RemoteRecord> {
        self.tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| row.id == id))
            .ok_or_else(|| not_found(table, id))
    }
}

fn unavailable() -> GatewayError {
    GatewayError::Api {
        status: 503,
        message: "remote table unavailable".to_string(),
    }
}

fn not_found(table: &str, id: &str) -> GatewayError {
    GatewayError::Api {
        status: 404,
        message: format!("no row {id} in {table}"),
    }
}

#[async_trait]
impl RemoteTable for MemoryTable {
    async fn list(
        &self,
        table: &str,
        filter: Option<&FieldFilter>,
    ) -> GatewayResult<Vec<RemoteRecord>> {
        let state = self.begin(Operation::List, table)?;
        let rows = state.tables.get(table).cloned().unwrap_or_default();
        Ok(match filter {
            Some(filter) => rows.into_iter().filter(|row| filter.matches(row)).collect(),
            None => rows,
        })
    }

    async fn get(&self, table: &str, id: &str) -> GatewayResult<RemoteRecord> {
        let mut state = self.begin(Operation::Get, table)?;
        state.find_mut(table, id).map(|row| row.clone())
    }

    async fn create(&self, table: &str, fields: &Fields) -> GatewayResult<RemoteRecord> {
        let mut state = self.begin(Operation::Create, table)?;
        Ok(state.insert(table, fields.clone()))
    }

    async fn update(&self, table: &str, id: &str, fields: &Fields) -> GatewayResult<RemoteRecord> {
        let mut state = self.begin(Operation::Update, table)?;
        let row = state.find_mut(table, id)?;
        for (name, value) in fields {
            row.fields.insert(name.clone(), value.clone());
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> GatewayResult<()> {
        let mut state = self.begin(Operation::Delete, table)?;
        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| not_found(table, id))?;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        if rows.len() == before {
            return Err(not_found(table, id));
        }
        Ok(())
    }
}
