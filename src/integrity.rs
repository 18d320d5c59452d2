//! Integrity validator
//!
//! Checks a materialized database against its schema's uniqueness and
//! referential constraints. Violations are plain data, never errors:
//! both passes run to completion and the caller decides what a non-empty
//! report means.
//!
//! A reference is satisfied iff every local-side projection also occurs
//! as a foreign-side projection. Each reference therefore gets one
//! shared set: rows of the foreign table insert their projection into it
//! during the key pass (which also makes duplicated foreign projections
//! a uniqueness violation), and rows of the local table probe it during
//! the reference pass. Two linear passes over the database suffice.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::datatype::Row;
use crate::render;
use crate::schema::Schema;

/// A materialized database body: relation name → rows.
pub type RowsByRelation = BTreeMap<Vec<u8>, Vec<Row>>;

/// The name of the implicit whole-row key every relation carries.
pub const NO_DUPLICATE_ROWS: &[u8] = b"NODUPLICATEROWS";

/// What kind of constraint a violation is about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, IntoStaticStr,
)]
pub enum ViolationKind {
    #[strum(serialize = "unique")]
    #[serde(rename = "unique")]
    Unique,
    #[strum(serialize = "referential")]
    #[serde(rename = "referential")]
    Referential,
}

/// One constraint violation.
///
/// All fields are rendered strings so the report can be serialized or
/// printed regardless of what bytes the database contained.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// The constraint's name: a declaration text, or `NODUPLICATEROWS`.
    pub constraint: String,
    pub relation: String,
    /// The offending row's fields, space-joined, rendered best-effort.
    pub row: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} ({}) violates {} constraint \"{}\"",
            self.relation, self.row, self.kind, self.constraint
        )
    }
}

/// One registered check: a projection probed against (or inserted into)
/// one of the constraint sets.
struct Check {
    constraint: Vec<u8>,
    columns: Vec<usize>,
    set: usize,
}

fn project(row: &Row, columns: &[usize]) -> Option<Row> {
    columns.iter().map(|&i| row.get(i).cloned()).collect()
}

fn report(kind: ViolationKind, check: &Check, relation: &[u8], row: &Row) -> Violation {
    Violation {
        kind,
        constraint: render::lossy(&check.constraint),
        relation: render::lossy(relation),
        row: row
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Check every key and reference of `schema` against `rows`.
///
/// Returns all violations, in deterministic order: relations in schema
/// order, rows in insertion order, constraints in registration order
/// (the implicit row key, then declared keys, then reference sets).
/// Relations missing from `rows` are treated as empty.
pub fn check_integrity(schema: &Schema, rows: &RowsByRelation) -> Vec<Violation> {
    let mut sets: Vec<HashSet<Row>> = Vec::new();
    let mut keys_of: BTreeMap<&[u8], Vec<Check>> = BTreeMap::new();
    let mut refs_of: BTreeMap<&[u8], Vec<Check>> = BTreeMap::new();

    for relation in schema.relations() {
        let arity = schema.arity(relation).unwrap_or(0);
        sets.push(HashSet::new());
        keys_of.insert(
            relation,
            vec![Check {
                constraint: NO_DUPLICATE_ROWS.to_vec(),
                columns: (0..arity).collect(),
                set: sets.len() - 1,
            }],
        );
        refs_of.insert(relation, Vec::new());
    }
    for name in schema.keys() {
        let key = schema.key(name).expect("declared key is resolved");
        sets.push(HashSet::new());
        keys_of
            .get_mut(key.relation.as_slice())
            .expect("key table exists")
            .push(Check {
                constraint: name.to_vec(),
                columns: key.columns.clone(),
                set: sets.len() - 1,
            });
    }
    for name in schema.references() {
        let reference = schema.reference(name).expect("declared reference is resolved");
        sets.push(HashSet::new());
        let set = sets.len() - 1;
        keys_of
            .get_mut(reference.foreign_relation.as_slice())
            .expect("foreign table exists")
            .push(Check {
                constraint: name.to_vec(),
                columns: reference.foreign_columns.clone(),
                set,
            });
        refs_of
            .get_mut(reference.local_relation.as_slice())
            .expect("local table exists")
            .push(Check {
                constraint: name.to_vec(),
                columns: reference.local_columns.clone(),
                set,
            });
    }

    let mut violations = Vec::new();
    let empty = Vec::new();

    // Key pass: fills every set, reporting duplicates.
    for relation in schema.relations() {
        let checks = &keys_of[relation];
        for row in rows.get(relation).unwrap_or(&empty) {
            for check in checks {
                let Some(projection) = project(row, &check.columns) else {
                    continue;
                };
                if !sets[check.set].insert(projection) {
                    violations.push(report(ViolationKind::Unique, check, relation, row));
                }
            }
        }
    }

    // Reference pass: probes the now-complete foreign sets.
    for relation in schema.relations() {
        let checks = &refs_of[relation];
        for row in rows.get(relation).unwrap_or(&empty) {
            for check in checks {
                let Some(projection) = project(row, &check.columns) else {
                    continue;
                };
                if !sets[check.set].contains(&projection) {
                    violations.push(report(
                        ViolationKind::Referential,
                        check,
                        relation,
                        row,
                    ));
                }
            }
        }
    }

    violations
}
