//! Shared tool-source concerns.
//!
//! This crate is intended to be used by:
//! - `specgate-openapi-tools` (OpenAPI-backed tool sources)
//! - `specgate-graphql-tools` (GraphQL-backed tool sources)
//! - `specgate-gateway` (session/header plumbing)
//!
//! It intentionally contains **no** spec parsing and **no** transport logic.

pub mod auth;
pub mod filter;
pub mod headers;
pub mod naming;
pub mod semantics;
