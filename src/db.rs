//! Database driver
//!
//! Ties the schema compiler, tuple codec, and integrity validator
//! together. Reading consumes an iterator of newline-stripped byte
//! lines: an optional inline schema header (`% `-prefixed lines) is
//! split off through a one-slot push-back buffer, the header is
//! compiled, and every remaining non-blank line is decoded into a row.
//! Writing emits the optional escaped header followed by every
//! relation's rows with fully deterministic ordering.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::codec::{self, RowError};
use crate::datatype::{DatatypeRegistry, EncodeError, Row};
use crate::integrity::{self, RowsByRelation, Violation};
use crate::lex;
use crate::render;
use crate::schema::{Schema, SchemaError};

/// Driver-level error: any failure that can abort a read or a write.
#[derive(Debug, Error)]
pub enum WslError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Row(#[from] RowError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("no such table \"{relation}\"")]
    UnknownRelation { relation: String },

    #[error("arity mismatch for table \"{relation}\": expected {expected} values, got {got}")]
    Arity {
        relation: String,
        expected: usize,
        got: usize,
    },
}

/// A one-slot push-back buffer over a line iterator.
///
/// Header splitting needs exactly one line of lookahead: the first
/// non-header line has already been consumed when the header ends, so it
/// is pushed back and yielded again by the body loop.
pub struct Lookahead<I: Iterator> {
    iter: I,
    buffered: Option<I::Item>,
}

impl<I: Iterator> Lookahead<I> {
    pub fn new(iter: I) -> Self {
        Self {
            iter,
            buffered: None,
        }
    }

    /// Push one item back; it is yielded before the underlying iterator.
    /// The slot must be empty.
    pub fn push_back(&mut self, item: I::Item) {
        debug_assert!(self.buffered.is_none(), "push-back slot already occupied");
        self.buffered = Some(item);
    }
}

impl<I: Iterator> Iterator for Lookahead<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        self.buffered.take().or_else(|| self.iter.next())
    }
}

/// Consume the contiguous leading `%` lines and reassemble the schema
/// text (newline-joined, `%` and space prefix stripped). The first
/// non-blank body line is pushed back.
fn split_header<I>(lines: &mut Lookahead<I>) -> Vec<u8>
where
    I: Iterator<Item = Vec<u8>>,
{
    let mut header = Vec::new();
    while let Some(line) = lines.next() {
        let line = lex::trim(&line);
        if line.is_empty() {
            continue;
        }
        if !line.starts_with(b"%") {
            lines.push_back(line.to_vec());
            break;
        }
        let content = line
            .iter()
            .position(|b| *b != b'%' && *b != b' ')
            .unwrap_or(line.len());
        header.extend_from_slice(&line[content..]);
        header.push(b'\n');
    }
    header
}

/// An in-memory WSL database: a compiled schema plus one row multiset
/// per relation.
#[derive(Debug, Clone)]
pub struct Database {
    schema: Schema,
    rows: RowsByRelation,
}

impl Database {
    /// An empty database over the given schema.
    pub fn new(schema: Schema) -> Self {
        let rows = schema
            .relations()
            .map(|r| (r.to_vec(), Vec::new()))
            .collect::<BTreeMap<_, _>>();
        Self { schema, rows }
    }

    /// Read a database whose schema is inlined as a `%` header, using
    /// the built-in datatypes.
    pub fn read<I>(lines: I) -> Result<Self, WslError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self::read_with(lines, &DatatypeRegistry::builtin())
    }

    /// Read a database with an inline schema header, resolving domain
    /// datatypes against a caller-supplied registry.
    pub fn read_with<I>(lines: I, registry: &DatatypeRegistry) -> Result<Self, WslError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut lines = Lookahead::new(lines.into_iter());
        let header = split_header(&mut lines);
        let schema = Schema::compile_with(&header, registry)?;
        Self::read_body(lines, schema)
    }

    /// Read a database body against an externally supplied schema. No
    /// header splitting happens: every non-blank line is a row.
    pub fn read_with_schema<I>(lines: I, schema: Schema) -> Result<Self, WslError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self::read_body(Lookahead::new(lines.into_iter()), schema)
    }

    fn read_body<I>(lines: Lookahead<I>, schema: Schema) -> Result<Self, WslError>
    where
        I: Iterator<Item = Vec<u8>>,
    {
        let mut db = Self::new(schema);
        for line in lines {
            let line = lex::trim(&line);
            if line.is_empty() {
                continue;
            }
            let (relation, row) = codec::decode_row(&db.schema, line)?;
            db.rows
                .get_mut(&relation)
                .expect("decoded rows name a schema relation")
                .push(row);
        }
        Ok(db)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rows of one relation, in insertion order. Empty for unknown names.
    pub fn rows(&self, relation: &[u8]) -> &[Row] {
        self.rows.get(relation).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// The full relation → rows mapping.
    pub fn rows_by_relation(&self) -> &RowsByRelation {
        &self.rows
    }

    pub fn into_parts(self) -> (Schema, RowsByRelation) {
        (self.schema, self.rows)
    }

    /// Append a row, validating that the relation exists and the arity
    /// matches. Constraint checking stays with [`Database::check`].
    pub fn insert(&mut self, relation: &[u8], row: Row) -> Result<(), WslError> {
        let Some(arity) = self.schema.arity(relation) else {
            return Err(WslError::UnknownRelation {
                relation: render::lossy(relation),
            });
        };
        if row.len() != arity {
            return Err(WslError::Arity {
                relation: render::lossy(relation),
                expected: arity,
                got: row.len(),
            });
        }
        self.rows
            .get_mut(relation)
            .expect("schema relations are materialized")
            .push(row);
        Ok(())
    }

    /// Report every key and reference violation in the database.
    pub fn check(&self) -> Vec<Violation> {
        integrity::check_integrity(&self.schema, &self.rows)
    }

    /// Serialize the database.
    ///
    /// Relations are emitted in name order; within a relation, rows are
    /// ordered by their encoded line bytes, so equal databases always
    /// serialize to equal bytes. With `inline_schema` the `% `-escaped
    /// schema header is prepended.
    pub fn write(&self, inline_schema: bool) -> Result<Vec<u8>, WslError> {
        let mut out = Vec::new();
        if inline_schema {
            out.extend_from_slice(&self.schema.embed());
        }
        for relation in self.schema.relations() {
            let mut lines = Vec::new();
            for row in self.rows(relation) {
                lines.push(codec::encode_row(&self.schema, relation, row)?);
            }
            lines.sort();
            for line in lines {
                out.extend_from_slice(&line);
            }
        }
        Ok(out)
    }
}
