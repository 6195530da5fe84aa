// Shared Connection
//
// A reference-counted handle over a backend. Nested and sibling queries may
// hold overlapping acquisitions; the backend is opened by the first acquire
// and closed by the last release.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::planner::parameters::ParameterValues;
use crate::query::sql::command::Command;
use crate::storage::cursor::Cursor;

/// Target backend that executes commands
pub trait Backend: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Physically open the backend connection
    fn open(&self) -> QueryResult<()>;

    /// Physically close the backend connection
    fn close(&self) -> QueryResult<()>;

    /// Execute a command with its bound parameter values and return a cursor
    /// over the result
    fn execute_reader(&self, command: &Command, parameters: &ParameterValues) -> QueryResult<Box<dyn Cursor>>;
}

#[derive(Debug, Default)]
struct ConnectionState {
    use_count: usize,
    acquisitions: u64,
    releases: u64,
}

/// Reference-counted connection shared by every query of a context
pub struct SharedConnection {
    backend: Arc<dyn Backend>,
    state: Mutex<ConnectionState>,
}

impl SharedConnection {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        SharedConnection {
            backend,
            state: Mutex::new(ConnectionState::default()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Take one use of the connection, opening the backend on first use
    pub fn acquire(&self) -> QueryResult<()> {
        let mut state = self.state.lock();
        if state.use_count == 0 {
            debug!("Opening connection to '{}'", self.backend.name());
            self.backend.open()?;
        }
        state.use_count += 1;
        state.acquisitions += 1;
        Ok(())
    }

    /// Give back one use of the connection, closing the backend when the last
    /// holder releases it
    pub fn release(&self) -> QueryResult<()> {
        let mut state = self.state.lock();
        if state.use_count == 0 {
            warn!("Release of connection to '{}' without a matching acquire", self.backend.name());
            return Err(QueryError::InvalidOperation(
                "Connection released more times than it was acquired".to_string(),
            ));
        }
        state.use_count -= 1;
        state.releases += 1;
        if state.use_count == 0 {
            debug!("Closing connection to '{}'", self.backend.name());
            self.backend.close()?;
        }
        Ok(())
    }

    /// Number of holders currently using the connection
    pub fn use_count(&self) -> usize {
        self.state.lock().use_count
    }

    pub fn is_open(&self) -> bool {
        self.use_count() > 0
    }

    /// Total (acquire, release) calls seen over the connection's lifetime
    pub fn totals(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.acquisitions, state.releases)
    }

    /// Execute on the backend. The caller must hold an acquisition.
    pub(crate) fn execute(&self, command: &Command, parameters: &ParameterValues) -> QueryResult<Box<dyn Cursor>> {
        if !self.is_open() {
            return Err(QueryError::Connection(format!(
                "Connection to '{}' must be acquired before executing a command",
                self.backend.name()
            )));
        }
        self.backend.execute_reader(command, parameters)
    }
}
