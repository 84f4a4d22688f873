//! Query service boundary: the client trait and its REST implementation

pub mod client;
pub mod rest;

#[cfg(test)]
pub(crate) mod memory;

pub use client::{Capabilities, FieldSchema, JobReference, QueryClient, QueryRequest, ResultPage};
pub use rest::{ClientArgs, ClientArgsBuilder, RestQueryClient};
