use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Connection, ConnectionConfig, Connector, QueryResult, RowWidthError, SqlValue};

/// One recorded interaction with the in-memory driver.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Connect { connection: usize, target: String },
    ConnectFailed { target: String },
    Query { connection: usize, query: String },
    Commit { connection: usize },
    Rollback { connection: usize },
    Close { connection: usize },
    /// A connection was dropped without being closed.
    Dropped { connection: usize },
    /// An operation was attempted on a closed connection.
    UseAfterClose { connection: usize, operation: &'static str },
}

#[derive(Debug, Default)]
struct JournalState {
    entries: Vec<JournalEntry>,
    next_id: usize,
    open: HashSet<usize>,
}

/// Shared, append-only record of everything the driver was asked to do.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    inner: Arc<Mutex<JournalState>>,
}

impl Journal {
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.inner.lock().entries.clone()
    }

    /// Queries executed, in order, across all connections.
    pub fn queries(&self) -> Vec<String> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Query { query, .. } => Some(query.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.count(|e| matches!(e, JournalEntry::Connect { .. }))
    }

    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, JournalEntry::Commit { .. }))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, JournalEntry::Rollback { .. }))
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, JournalEntry::Close { .. }))
    }

    pub fn uses_after_close(&self) -> usize {
        self.count(|e| matches!(e, JournalEntry::UseAfterClose { .. }))
    }

    /// Connections handed out and neither closed nor dropped yet.
    pub fn open_connections(&self) -> usize {
        self.inner.lock().open.len()
    }

    fn count(&self, predicate: impl Fn(&JournalEntry) -> bool) -> usize {
        self.inner.lock().entries.iter().filter(|e| predicate(e)).count()
    }

    fn record(&self, entry: JournalEntry) {
        self.inner.lock().entries.push(entry);
    }

    fn open(&self, target: String) -> usize {
        let mut state = self.inner.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.open.insert(id);
        state.entries.push(JournalEntry::Connect { connection: id, target });
        id
    }

    fn release(&self, id: usize, entry: JournalEntry) {
        let mut state = self.inner.lock();
        state.open.remove(&id);
        state.entries.push(entry);
    }
}

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<QueryResult>,
    failing_queries: HashSet<String>,
    fail_connect: bool,
    fail_commit: bool,
    fail_rollback: bool,
    fail_close: bool,
}

/// An in-memory connector for testing units of work.
///
/// Responses are scripted up front and every call is recorded in a
/// [`Journal`] shared by all connections the connector hands out.
///
/// # Example
/// ```
/// use query_unit_of_work::drivers::{InMemoryConnector, InMemoryResponseBuilder};
///
/// let connector = InMemoryConnector::new().with_response(
///     InMemoryResponseBuilder::new()
///         .columns(&["id", "name"])
///         .row(vec![1i64.into(), "Alice".into()])
///         .build()
///         .unwrap(),
/// );
/// assert_eq!(connector.journal().connects(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    script: Arc<Mutex<Script>>,
    journal: Journal,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next query. Responses are served FIFO;
    /// once exhausted, queries return an empty result.
    pub fn with_response(self, response: QueryResult) -> Self {
        self.script.lock().responses.push_back(response);
        self
    }

    /// Make every execution of `query` fail.
    pub fn fail_query(self, query: impl Into<String>) -> Self {
        self.script.lock().failing_queries.insert(query.into());
        self
    }

    pub fn fail_connect(self) -> Self {
        self.script.lock().fail_connect = true;
        self
    }

    pub fn fail_commit(self) -> Self {
        self.script.lock().fail_commit = true;
        self
    }

    pub fn fail_rollback(self) -> Self {
        self.script.lock().fail_rollback = true;
        self
    }

    pub fn fail_close(self) -> Self {
        self.script.lock().fail_close = true;
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    type Connection = InMemoryConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, sqlx::Error> {
        if self.script.lock().fail_connect {
            self.journal.record(JournalEntry::ConnectFailed {
                target: config.target(),
            });
            return Err(sqlx::Error::Protocol(format!(
                "connection refused: {}",
                config.target()
            )));
        }

        let id = self.journal.open(config.target());
        Ok(InMemoryConnection {
            id,
            closed: false,
            aborted: false,
            script: Arc::clone(&self.script),
            journal: self.journal.clone(),
        })
    }
}

/// Connection handed out by [`InMemoryConnector`].
#[derive(Debug)]
pub struct InMemoryConnection {
    id: usize,
    closed: bool,
    /// Set by a failed query; the transaction can then only be rolled back.
    aborted: bool,
    script: Arc<Mutex<Script>>,
    journal: Journal,
}

impl InMemoryConnection {
    pub fn id(&self) -> usize {
        self.id
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), sqlx::Error> {
        if self.closed {
            self.journal.record(JournalEntry::UseAfterClose {
                connection: self.id,
                operation,
            });
            return Err(sqlx::Error::PoolClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn fetch_all(&mut self, query: &str) -> Result<QueryResult, sqlx::Error> {
        self.ensure_open("fetch_all")?;
        self.journal.record(JournalEntry::Query {
            connection: self.id,
            query: query.to_string(),
        });

        let response = {
            let mut script = self.script.lock();
            if script.failing_queries.contains(query) {
                None
            } else {
                Some(script.responses.pop_front().unwrap_or_default())
            }
        };
        match response {
            Some(result) => Ok(result),
            None => {
                self.aborted = true;
                Err(sqlx::Error::Protocol(format!("syntax error in {query:?}")))
            }
        }
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        self.ensure_open("commit")?;
        self.journal.record(JournalEntry::Commit { connection: self.id });

        if self.aborted {
            return Err(sqlx::Error::Protocol(
                "transaction aborted by a failed statement".to_string(),
            ));
        }
        if self.script.lock().fail_commit {
            return Err(sqlx::Error::Protocol("could not serialize access".to_string()));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.ensure_open("rollback")?;
        self.journal.record(JournalEntry::Rollback { connection: self.id });

        if self.script.lock().fail_rollback {
            return Err(sqlx::Error::Protocol("connection reset during rollback".to_string()));
        }
        Ok(())
    }

    async fn close(mut self) -> Result<(), sqlx::Error> {
        self.ensure_open("close")?;
        self.closed = true;
        self.journal
            .release(self.id, JournalEntry::Close { connection: self.id });

        if self.script.lock().fail_close {
            return Err(sqlx::Error::Protocol("close timed out".to_string()));
        }
        Ok(())
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.journal
                .release(self.id, JournalEntry::Dropped { connection: self.id });
        }
    }
}

/// Builder for scripted query results.
#[derive(Debug, Default)]
pub struct InMemoryResponseBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl InMemoryResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn build(self) -> Result<QueryResult, RowWidthError> {
        QueryResult::new(self.columns, self.rows)
    }
}
