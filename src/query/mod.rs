// BayunDB Query Pipeline Module
//
// This module contains components for plan specialization, command
// generation and result materialization.

pub mod executor;
pub mod planner;
pub mod sql;

// Export key public interfaces
pub use executor::enumerable::QueryingEnumerable;
pub use executor::result::QueryResult;
