//! Tuple codec
//!
//! Encodes and decodes one body line against a compiled schema. A body
//! line is the relation name followed by one field per column, separated
//! by single spaces. The codec owns the line-level grammar (spaces,
//! bracket placement, trailing-EOL check) and delegates token
//! interpretation to the column datatypes.

use thiserror::Error;

use crate::datatype::{DecodeError, EncodeError, Row, SyntaxKind, Value};
use crate::lex::{self, LexError};
use crate::render;
use crate::schema::Schema;

/// A body line failed to decode.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("{message} at byte {at} in line \"{line}\"")]
    Syntax {
        at: usize,
        message: String,
        line: String,
    },

    #[error("no such table \"{relation}\" while parsing line \"{line}\"")]
    UnknownRelation { relation: String, line: String },

    #[error("bad \"{domain}\" value at byte {at} in line \"{line}\": {source}")]
    Value {
        domain: String,
        at: usize,
        line: String,
        #[source]
        source: DecodeError,
    },
}

fn syntax_error(line: &[u8], err: LexError) -> RowError {
    RowError::Syntax {
        at: err.at,
        message: err.message.to_string(),
        line: render::lossy(line),
    }
}

/// Decode one body line into its relation name and row.
///
/// The line must already be stripped of its newline and surrounding
/// whitespace; the driver does that before calling in.
pub fn decode_row(schema: &Schema, line: &[u8]) -> Result<(Vec<u8>, Row), RowError> {
    let (relation, mut at) = lex::atom(line, 0).map_err(|e| syntax_error(line, e))?;
    let datatypes = schema.datatypes_of_relation(relation).ok_or_else(|| {
        RowError::UnknownRelation {
            relation: render::lossy(relation),
            line: render::lossy(line),
        }
    })?;
    let domains = schema
        .domains_of_relation(relation)
        .expect("relation resolved together with its datatypes");

    let mut row = Row::with_capacity(datatypes.len());
    for (datatype, domain) in datatypes.iter().zip(domains) {
        at = lex::space(line, at).map_err(|e| syntax_error(line, e))?;
        let token_at = at;
        let (token, next) = match datatype.syntax() {
            SyntaxKind::Atom => lex::atom(line, at),
            SyntaxKind::String => lex::string(line, at),
        }
        .map_err(|e| syntax_error(line, e))?;
        let value = datatype.decode(token).map_err(|source| RowError::Value {
            domain: render::lossy(domain),
            at: token_at,
            line: render::lossy(line),
            source,
        })?;
        row.push(value);
        at = next;
    }
    if at != line.len() {
        return Err(RowError::Syntax {
            at,
            message: "expected EOL".to_string(),
            line: render::lossy(line),
        });
    }
    Ok((relation.to_vec(), row))
}

/// Encode one row as a newline-terminated body line.
///
/// Tokens come from the column datatypes, which reject values their wire
/// grammar cannot carry; string-syntax tokens are wrapped in brackets
/// here.
pub fn encode_row(
    schema: &Schema,
    relation: &[u8],
    row: &[Value],
) -> Result<Vec<u8>, EncodeError> {
    let datatypes = schema.datatypes_of_relation(relation).ok_or_else(|| {
        EncodeError::new(format!("no such table \"{}\"", render::lossy(relation)))
    })?;
    if row.len() != datatypes.len() {
        return Err(EncodeError::new(format!(
            "arity mismatch for table \"{}\": expected {} values, got {}",
            render::lossy(relation),
            datatypes.len(),
            row.len()
        )));
    }

    let mut out = Vec::with_capacity(relation.len() + 16 * row.len());
    out.extend_from_slice(relation);
    for (value, datatype) in row.iter().zip(datatypes) {
        out.push(b' ');
        let token = datatype.encode(value)?;
        match datatype.syntax() {
            SyntaxKind::Atom => out.extend_from_slice(&token),
            SyntaxKind::String => {
                out.push(b'[');
                out.extend_from_slice(&token);
                out.push(b']');
            }
        }
    }
    out.push(b'\n');
    Ok(out)
}
