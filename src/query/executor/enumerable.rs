// Streaming Query Results
//
// A `QueryingEnumerable` is a reusable description of a query: plan, shaper
// and context. Each call to `enumerator` starts an independent execution that
// is driven one element at a time by the caller.
//
// Execution is deferred to the first advance. That advance snapshots the
// parameters, acquires the shared connection, specializes the plan, compiles
// and executes the command and opens the reader. Every later advance either
// consumes a lookahead value left by the shaper or performs exactly one
// physical read, then shapes one element.

use std::fmt;
use std::mem;
use std::sync::Arc;

use log::{debug, warn};

use crate::query::executor::context::QueryContext;
use crate::query::executor::coordinator::ResultCoordinator;
use crate::query::executor::diagnostics::QueryIterationFailed;
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::executor::shaper::Shaper;
use crate::query::planner::logical::LogicalPlan;
use crate::query::planner::optimizer::ParameterValueBasedOptimizer;
use crate::query::planner::parameters::ParameterValues;
use crate::query::sql::generator::{CommandCompilerFactory, SqlGeneratorFactory};
use crate::storage::cursor::DataReader;

/// Lazily executed, re-enumerable query
pub struct QueryingEnumerable<T> {
    context: Arc<QueryContext>,
    plan: Arc<LogicalPlan>,
    optimizer: ParameterValueBasedOptimizer,
    compiler_factory: Arc<dyn CommandCompilerFactory>,
    shaper: Shaper<T>,
    context_type: String,
}

impl<T> Clone for QueryingEnumerable<T> {
    fn clone(&self) -> Self {
        QueryingEnumerable {
            context: self.context.clone(),
            plan: self.plan.clone(),
            optimizer: self.optimizer.clone(),
            compiler_factory: self.compiler_factory.clone(),
            shaper: self.shaper.clone(),
            context_type: self.context_type.clone(),
        }
    }
}

impl<T> QueryingEnumerable<T> {
    pub fn new(context: Arc<QueryContext>, plan: impl Into<Arc<LogicalPlan>>, shaper: Shaper<T>) -> Self {
        let compiler_factory = Arc::new(SqlGeneratorFactory::new(context.config().sql.clone()));
        let context_type = context.config().context_type.clone();
        QueryingEnumerable {
            context,
            plan: plan.into(),
            optimizer: ParameterValueBasedOptimizer::new(),
            compiler_factory,
            shaper,
            context_type,
        }
    }

    pub fn with_compiler_factory(mut self, compiler_factory: Arc<dyn CommandCompilerFactory>) -> Self {
        self.compiler_factory = compiler_factory;
        self
    }

    /// Name of the consuming context type reported when iteration fails
    pub fn with_context_type(mut self, context_type: &str) -> Self {
        self.context_type = context_type.to_string();
        self
    }

    pub fn plan(&self) -> &LogicalPlan {
        &self.plan
    }

    /// Start a new, not yet executed enumeration
    pub fn enumerator(&self) -> QueryingEnumerator<T> {
        QueryingEnumerator {
            query: self.clone(),
            state: EnumeratorState::NotStarted,
            current: None,
            connection_acquired: false,
        }
    }

    /// Run the query to completion and collect every element
    pub fn to_vec(&self) -> QueryResult<Vec<T>> {
        let mut enumerator = self.enumerator();
        let mut elements = Vec::new();
        while enumerator.move_next()? {
            if let Some(element) = enumerator.take_current() {
                elements.push(element);
            }
        }
        enumerator.dispose()?;
        Ok(elements)
    }
}

impl<T> IntoIterator for &QueryingEnumerable<T> {
    type Item = QueryResult<T>;
    type IntoIter = QueryingEnumerator<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.enumerator()
    }
}

impl<T> IntoIterator for QueryingEnumerable<T> {
    type Item = QueryResult<T>;
    type IntoIter = QueryingEnumerator<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.enumerator()
    }
}

/// Observable lifecycle of an enumerator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumeratorStatus {
    NotStarted,
    Open,
    Exhausted,
    Failed,
    Disposed,
}

impl fmt::Display for EnumeratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

enum EnumeratorState {
    NotStarted,
    Open {
        reader: DataReader,
        coordinator: ResultCoordinator,
    },
    Exhausted,
    /// Whatever reader was open when the failure happened is kept until
    /// disposal
    Failed {
        reader: Option<DataReader>,
    },
    Disposed,
}

/// One execution of a [`QueryingEnumerable`]
pub struct QueryingEnumerator<T> {
    query: QueryingEnumerable<T>,
    state: EnumeratorState,
    current: Option<T>,
    connection_acquired: bool,
}

impl<T> QueryingEnumerator<T> {
    pub fn status(&self) -> EnumeratorStatus {
        match self.state {
            EnumeratorState::NotStarted => EnumeratorStatus::NotStarted,
            EnumeratorState::Open { .. } => EnumeratorStatus::Open,
            EnumeratorState::Exhausted => EnumeratorStatus::Exhausted,
            EnumeratorState::Failed { .. } => EnumeratorStatus::Failed,
            EnumeratorState::Disposed => EnumeratorStatus::Disposed,
        }
    }

    /// Element produced by the last successful advance
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn take_current(&mut self) -> Option<T> {
        self.current.take()
    }

    /// Pending lookahead value, if the reader is open
    pub fn pending_lookahead(&self) -> Option<bool> {
        match &self.state {
            EnumeratorState::Open { coordinator, .. } => coordinator.peek(),
            _ => None,
        }
    }

    /// Physical reads issued so far by the open reader
    pub fn read_count(&self) -> Option<usize> {
        match &self.state {
            EnumeratorState::Open { reader, .. } => Some(reader.read_count()),
            EnumeratorState::Failed { reader: Some(reader) } => Some(reader.read_count()),
            _ => None,
        }
    }

    /// Advance to the next element. Returns false once the results are
    /// exhausted.
    ///
    /// Failures are reported to the context's logger and returned unchanged.
    /// A failed enumerator keeps its resources until it is disposed.
    pub fn move_next(&mut self) -> QueryResult<bool> {
        match self.state {
            EnumeratorState::Exhausted => return Ok(false),
            EnumeratorState::Failed { .. } => {
                return Err(QueryError::InvalidOperation(
                    "Enumerator failed; dispose it and start a new enumeration".to_string(),
                ));
            }
            EnumeratorState::Disposed => {
                return Err(QueryError::InvalidOperation("Enumerator has been disposed".to_string()));
            }
            EnumeratorState::NotStarted | EnumeratorState::Open { .. } => {}
        }

        match self.advance() {
            Ok(has_row) => Ok(has_row),
            Err(error) => {
                self.current = None;
                self.fail();
                self.query.context.logger().query_iteration_failed(&QueryIterationFailed {
                    context_type: &self.query.context_type,
                    context_id: self.query.context.context_id(),
                    error: &error,
                });
                Err(error)
            }
        }
    }

    fn advance(&mut self) -> QueryResult<bool> {
        if let EnumeratorState::NotStarted = self.state {
            self.open()?;
        }

        let EnumeratorState::Open { reader, coordinator } = &mut self.state else {
            return Err(QueryError::InvalidOperation("Enumerator is not open".to_string()));
        };

        // A pending lookahead means the shaper already read the row this
        // element starts from
        let has_row = match coordinator.take() {
            Some(pending) => pending,
            None => reader.read()?,
        };

        if has_row {
            let element = (self.query.shaper)(&self.query.context, reader, coordinator)?;
            self.current = Some(element);
            Ok(true)
        } else {
            self.current = None;
            let released = self.release_resources();
            self.state = EnumeratorState::Exhausted;
            released.map(|_| false)
        }
    }

    fn open(&mut self) -> QueryResult<()> {
        let parameters = self.query.context.parameter_values();
        let connection = self.query.context.connection().clone();

        connection.acquire()?;
        self.connection_acquired = true;

        match self.execute(&parameters) {
            Ok(reader) => {
                self.state = EnumeratorState::Open {
                    reader,
                    coordinator: ResultCoordinator::new(),
                };
                Ok(())
            }
            Err(error) => {
                // No reader exists yet to give the connection back on disposal
                self.connection_acquired = false;
                if let Err(release_error) = connection.release() {
                    warn!("Releasing connection after failed execution: {}", release_error);
                }
                Err(error)
            }
        }
    }

    fn execute(&self, parameters: &ParameterValues) -> QueryResult<DataReader> {
        let context = &self.query.context;
        let specialized = self.query.optimizer.optimize(&self.query.plan, parameters)?;
        let command = self.query.compiler_factory.create().compile(&specialized)?;
        debug!("Compiled command for {}: {}", context.context_id(), command.text);
        command.execute_reader(context.connection(), parameters, context.logger().as_ref())
    }

    fn fail(&mut self) {
        self.state = match mem::replace(&mut self.state, EnumeratorState::Disposed) {
            EnumeratorState::Open { reader, .. } => EnumeratorState::Failed { reader: Some(reader) },
            EnumeratorState::Failed { reader } => EnumeratorState::Failed { reader },
            _ => EnumeratorState::Failed { reader: None },
        };
    }

    /// Close the reader if one is held, then give back the connection.
    /// Leaves the state as `Disposed`; callers set the final state.
    fn release_resources(&mut self) -> QueryResult<()> {
        let mut first_error = None;

        let state = mem::replace(&mut self.state, EnumeratorState::Disposed);
        if let EnumeratorState::Open { mut reader, .. } | EnumeratorState::Failed { reader: Some(mut reader) } = state {
            if let Err(e) = reader.close() {
                first_error.get_or_insert(e);
            }
        }

        if self.connection_acquired {
            self.connection_acquired = false;
            if let Err(e) = self.query.context.connection().release() {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Release the reader and the connection. Disposing twice is a no-op.
    pub fn dispose(&mut self) -> QueryResult<()> {
        if let EnumeratorState::Disposed = self.state {
            return Ok(());
        }
        self.current = None;
        let released = self.release_resources();
        self.state = EnumeratorState::Disposed;
        released
    }

    /// Enumerators cannot be restarted; call `enumerator` again instead
    pub fn reset(&mut self) -> QueryResult<()> {
        Err(QueryError::InvalidOperation(format!(
            "Reset is not supported (enumerator is {}); start a new enumeration instead",
            self.status()
        )))
    }
}

impl<T> Iterator for QueryingEnumerator<T> {
    type Item = QueryResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.status() {
            EnumeratorStatus::NotStarted | EnumeratorStatus::Open => {}
            _ => return None,
        }
        match self.move_next() {
            Ok(true) => self.current.take().map(Ok),
            Ok(false) => None,
            Err(error) => Some(Err(error)),
        }
    }
}

impl<T> Drop for QueryingEnumerator<T> {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!("Error disposing query enumerator: {}", e);
        }
    }
}
