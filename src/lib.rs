//! wsl: reader, writer and integrity checker for WSL relational database files
//!
//! WSL is a line-oriented, human-readable, self-describing relational
//! database format: a schema declares domains, tables, keys and
//! references, and the body carries one tuple per line. The schema can
//! live in a separate byte string or ride along as a `% `-prefixed
//! header at the top of the body.
//!
//! The crate compiles schema text into a typed [`Schema`], decodes and
//! encodes body lines against it, validates uniqueness and referential
//! integrity, and round-trips whole databases with deterministic output.
//! All on-the-wire data is bytes; I/O stays with the caller, who feeds
//! in an iterator of newline-stripped lines and gets a byte vector back.

pub mod codec;
pub mod datatype;
pub mod db;
pub mod integrity;
pub mod lex;
pub mod render;
pub mod schema;

// Re-export commonly used types
pub use codec::{RowError, decode_row, encode_row};
pub use datatype::{
    Datatype, DatatypeError, DatatypeRegistry, DecodeError, EncodeError, Row, SyntaxKind,
    Value,
};
pub use db::{Database, Lookahead, WslError};
pub use integrity::{RowsByRelation, Violation, ViolationKind, check_integrity};
pub use schema::{KeyConstraint, ReferenceConstraint, Schema, SchemaError};
