//! Core types and traits of the pipeline.
//!
//! - [`schema`]: engine data types, resolved query schema, target table
//! - [`identifier`]: identifier validation and quoting
//! - [`traits`]: seams to the store, the coordinator and the stream engine
//!
//! Concrete implementations live in `store`, `coordinator` and `engine`;
//! the pipeline depends only on what is defined here.

pub mod identifier;
pub mod schema;
pub mod traits;

pub use schema::{
    split_table_reference, Column, DataType, ResolvedSchema, TablePath, TargetTable, TypeKind,
};
pub use traits::{
    Coordinator, CoordinatorFactory, JobClient, StreamEngine, TableEnvironment, TableGateway,
};
