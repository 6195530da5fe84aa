// Storage Module
//
// Backends, the shared reference-counted connection and cursors.

pub mod connection;
pub mod cursor;
pub mod memory;

pub use self::connection::{Backend, SharedConnection};
pub use self::cursor::{Cursor, DataReader};
pub use self::memory::{Dataset, MemoryBackend, MemoryTable};
