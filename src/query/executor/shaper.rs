// Shapers
//
// A shaper turns the row a reader is positioned on into one output element.
// Elements never borrow from the reader: the row buffer is replaced on the
// next physical read.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::query::executor::context::QueryContext;
use crate::query::executor::coordinator::ResultCoordinator;
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Row};
use crate::storage::cursor::DataReader;

/// Builds one output element from the current row
pub type Shaper<T> = Arc<dyn Fn(&QueryContext, &mut DataReader, &mut ResultCoordinator) -> QueryResult<T> + Send + Sync>;

/// Wrap a closure as a shaper
pub fn shaper<T, F>(f: F) -> Shaper<T>
where
    F: Fn(&QueryContext, &mut DataReader, &mut ResultCoordinator) -> QueryResult<T> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Shaper that copies the current row
pub fn row_shaper() -> Shaper<Row> {
    shaper(|_, reader, _| Ok(reader.current()?.clone()))
}

/// Shaper that deserializes the current row into `T`, matching fields by
/// column name
pub fn typed_shaper<T: DeserializeOwned + 'static>() -> Shaper<T> {
    shaper(|_, reader, _| deserialize_row(reader.current()?))
}

/// Deserialize a row into `T`, matching fields by column name
pub fn deserialize_row<T: DeserializeOwned>(row: &Row) -> QueryResult<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(row.to_json_object()))?)
}

/// One logical element built from a run of rows sharing a key
#[derive(Debug, Clone, PartialEq)]
pub struct Group<E> {
    pub key: Vec<DataValue>,
    pub elements: Vec<E>,
}

type ElementFn<E> = Arc<dyn Fn(&Row) -> QueryResult<Option<E>> + Send + Sync>;

/// Groups consecutive rows with equal key columns into one [`Group`].
///
/// The input must be ordered by the key columns. To find the end of a group
/// the shaper reads one row past it and leaves the answer on the coordinator,
/// so the enumerator starts the next group from that row instead of reading
/// again.
pub struct GroupingShaper<E> {
    key_columns: Vec<String>,
    element: ElementFn<E>,
}

impl<E: 'static> GroupingShaper<E> {
    /// `element` returns `None` for rows that carry no element, such as the
    /// NULL-padded row of a LEFT JOIN without a match
    pub fn new<F>(key_columns: &[&str], element: F) -> Self
    where
        F: Fn(&Row) -> QueryResult<Option<E>> + Send + Sync + 'static,
    {
        GroupingShaper {
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
            element: Arc::new(element),
        }
    }

    fn key(&self, row: &Row) -> QueryResult<Vec<DataValue>> {
        self.key_columns
            .iter()
            .map(|column| {
                row.get(column)
                    .cloned()
                    .ok_or_else(|| QueryError::ColumnNotFound(column.clone()))
            })
            .collect()
    }

    fn shape(&self, reader: &mut DataReader, coordinator: &mut ResultCoordinator) -> QueryResult<Group<E>> {
        let first = reader.current()?;
        let key = self.key(first)?;
        let mut elements = Vec::new();
        if let Some(element) = (self.element)(first)? {
            elements.push(element);
        }

        loop {
            if !reader.read()? {
                coordinator.set_has_next(false);
                break;
            }
            let row = reader.current()?;
            if self.key(row)? != key {
                coordinator.set_has_next(true);
                break;
            }
            if let Some(element) = (self.element)(row)? {
                elements.push(element);
            }
        }

        Ok(Group { key, elements })
    }

    pub fn into_shaper(self) -> Shaper<Group<E>> {
        shaper(move |_, reader, coordinator| self.shape(reader, coordinator))
    }
}

impl GroupingShaper<Row> {
    /// Group rows, keeping each row of the group as an element
    pub fn rows(key_columns: &[&str]) -> Self {
        GroupingShaper::new(key_columns, |row| Ok(Some(row.clone())))
    }
}
