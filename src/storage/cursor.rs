// Cursor abstraction
//
// A cursor is a live, connection-bound handle that yields rows one at a time.
// The row returned by `current` is only valid until the next `read`.

use log::{debug, warn};

use crate::query::executor::result::{QueryError, QueryResult, Row};

/// Server-side cursor produced by a backend
pub trait Cursor: Send {
    /// Output column names
    fn columns(&self) -> &[String];

    /// Advance to the next row. Returns false once the cursor is exhausted.
    fn read(&mut self) -> QueryResult<bool>;

    /// The row the cursor is positioned on, if any
    fn current(&self) -> Option<&Row>;

    /// Release backend resources held by the cursor
    fn close(&mut self) -> QueryResult<()> {
        Ok(())
    }
}

/// Exclusive owner of one open cursor
pub struct DataReader {
    cursor: Option<Box<dyn Cursor>>,
    read_count: usize,
}

impl DataReader {
    pub fn new(cursor: Box<dyn Cursor>) -> Self {
        DataReader {
            cursor: Some(cursor),
            read_count: 0,
        }
    }

    fn cursor(&self) -> QueryResult<&dyn Cursor> {
        self.cursor
            .as_deref()
            .ok_or_else(|| QueryError::InvalidOperation("Data reader is closed".to_string()))
    }

    /// Perform one physical read
    pub fn read(&mut self) -> QueryResult<bool> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| QueryError::InvalidOperation("Data reader is closed".to_string()))?;
        self.read_count += 1;
        cursor.read()
    }

    /// The row the reader is positioned on
    pub fn current(&self) -> QueryResult<&Row> {
        self.cursor()?
            .current()
            .ok_or_else(|| QueryError::InvalidOperation("No current row; call read first".to_string()))
    }

    pub fn columns(&self) -> QueryResult<&[String]> {
        Ok(self.cursor()?.columns())
    }

    /// Number of physical reads issued so far
    pub fn read_count(&self) -> usize {
        self.read_count
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    /// Close the underlying cursor. Closing twice is a no-op.
    pub fn close(&mut self) -> QueryResult<()> {
        match self.cursor.take() {
            Some(mut cursor) => {
                debug!("Closing data reader after {} read(s)", self.read_count);
                cursor.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for DataReader {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing data reader on drop: {}", e);
        }
    }
}
