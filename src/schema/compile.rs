//! Schema compiler
//!
//! Two stages, both fail-fast. The declaration scan walks the schema
//! text line by line, recording each `DOMAIN`, `TABLE`, `KEY` and
//! `REFERENCE` declaration under its name (unknown directives are
//! ignored for forward compatibility). The resolution passes then turn
//! the recorded text into the typed model: datatypes from the registry,
//! column lists, and constraint column indices.

use std::collections::{BTreeMap, BTreeSet};

use super::{KeyConstraint, ReferenceConstraint, Schema, SchemaError};
use crate::datatype::DatatypeRegistry;
use crate::lex::trim;
use crate::render;

/// Split off the first whitespace-delimited word; the remainder is
/// trimmed at the front. Returns `(line, b"")` when there is no
/// whitespace.
fn split_first_word(line: &[u8]) -> (&[u8], &[u8]) {
    match line.iter().position(|b| b.is_ascii_whitespace()) {
        Some(at) => {
            let rest = &line[at..];
            let skip = rest
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(rest.len());
            (&line[..at], &rest[skip..])
        }
        None => (line, b""),
    }
}

/// Split into whitespace-delimited words.
fn words(bytes: &[u8]) -> Vec<&[u8]> {
    bytes
        .split(|b| b.is_ascii_whitespace())
        .filter(|w| !w.is_empty())
        .collect()
}

/// A logic-tuple variable: alphanumeric, starting with a letter.
fn is_variable(v: &[u8]) -> bool {
    v.first().is_some_and(|b| b.is_ascii_alphabetic())
        && v.iter().all(|b| b.is_ascii_alphanumeric())
}

/// Split a reference declaration on its single `=>`.
fn split_reference(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let mut found = None;
    for at in 0..line.len().saturating_sub(1) {
        if &line[at..at + 2] == b"=>" {
            if found.is_some() {
                return None;
            }
            found = Some(at);
        }
    }
    found.map(|at| (trim(&line[..at]), trim(&line[at + 2..])))
}

pub(crate) fn compile(
    source: &[u8],
    registry: &DatatypeRegistry,
) -> Result<Schema, SchemaError> {
    let mut schema = Schema {
        source: source.to_vec(),
        ..Schema::default()
    };

    // Declaration scan.
    for raw in source.split(|b| *b == b'\n') {
        let line = trim(raw);
        if line.is_empty() {
            continue;
        }
        let (directive, rest) = split_first_word(line);
        if directive == b"DOMAIN" || directive == b"TABLE" {
            let (name, decl) = split_first_word(rest);
            if name.is_empty() || decl.is_empty() {
                return Err(SchemaError::Malformed {
                    line: render::lossy(line),
                });
            }
            if directive == b"DOMAIN" {
                if !schema.domains.insert(name.to_vec()) {
                    return Err(SchemaError::AlreadyDeclared {
                        kind: "domain",
                        name: render::lossy(name),
                    });
                }
                schema.source_of_domain.insert(name.to_vec(), decl.to_vec());
            } else {
                if !schema.relations.insert(name.to_vec()) {
                    return Err(SchemaError::AlreadyDeclared {
                        kind: "table",
                        name: render::lossy(name),
                    });
                }
                schema
                    .source_of_relation
                    .insert(name.to_vec(), decl.to_vec());
            }
        } else if directive == b"KEY" || directive == b"REFERENCE" {
            // The declaration text is the constraint's name; declaring
            // the exact same text twice is a no-op.
            if rest.is_empty() {
                return Err(SchemaError::Malformed {
                    line: render::lossy(line),
                });
            }
            if directive == b"KEY" {
                schema.keys.insert(rest.to_vec());
                schema.source_of_key.insert(rest.to_vec(), rest.to_vec());
            } else {
                schema.references.insert(rest.to_vec());
                schema
                    .source_of_reference
                    .insert(rest.to_vec(), rest.to_vec());
            }
        }
        // Unknown directives are ignored.
    }

    // Resolution pass 1: domain datatypes via the registry.
    for domain in &schema.domains {
        let decl = &schema.source_of_domain[domain];
        let (datatype, args) = split_first_word(decl);
        let factory =
            registry
                .get(datatype)
                .ok_or_else(|| SchemaError::UnknownDatatype {
                    domain: render::lossy(domain),
                    datatype: render::lossy(datatype),
                })?;
        schema
            .datatype_of_domain
            .insert(domain.clone(), factory(args)?);
    }

    // Resolution pass 2: relation column lists.
    for relation in &schema.relations {
        let columns = words(&schema.source_of_relation[relation])
            .into_iter()
            .map(|w| w.to_vec())
            .collect();
        schema.domains_of_relation.insert(relation.clone(), columns);
    }

    // Resolution pass 3: keys.
    for name in &schema.keys {
        let tuple = words(name);
        let (relation, vars) = tuple.split_first().expect("key name is non-blank");
        let arity = schema
            .domains_of_relation
            .get(*relation)
            .ok_or_else(|| SchemaError::UnknownTable {
                relation: render::lossy(relation),
                constraint: render::lossy(name),
            })?
            .len();
        if vars.len() != arity {
            return Err(SchemaError::ArityMismatch {
                relation: render::lossy(relation),
                constraint: render::lossy(name),
            });
        }
        let mut seen = BTreeSet::new();
        let mut columns = Vec::new();
        for (i, var) in vars.iter().enumerate() {
            if *var == b"*" {
                continue;
            }
            if !is_variable(var) {
                return Err(SchemaError::InvalidVariable {
                    variable: render::lossy(var),
                    constraint: render::lossy(name),
                });
            }
            if !seen.insert(*var) {
                return Err(SchemaError::DuplicateVariable {
                    variable: render::lossy(var),
                    constraint: render::lossy(name),
                });
            }
            columns.push(i);
        }
        schema.key_of.insert(
            name.clone(),
            KeyConstraint {
                relation: relation.to_vec(),
                columns,
            },
        );
    }

    // Resolution pass 4: references. Each side yields a variable→column
    // map; the index lists come out sorted by variable name, which
    // aligns position i on the two sides.
    for name in &schema.references {
        let (local, foreign) =
            split_reference(name).ok_or_else(|| SchemaError::MalformedReference {
                line: render::lossy(name),
            })?;
        let mut sides = Vec::with_capacity(2);
        for side in [local, foreign] {
            let tuple = words(side);
            let Some((relation, vars)) = tuple.split_first() else {
                return Err(SchemaError::MalformedReference {
                    line: render::lossy(name),
                });
            };
            let arity = schema
                .domains_of_relation
                .get(*relation)
                .ok_or_else(|| SchemaError::UnknownTable {
                    relation: render::lossy(relation),
                    constraint: render::lossy(name),
                })?
                .len();
            if vars.len() != arity {
                return Err(SchemaError::ArityMismatch {
                    relation: render::lossy(relation),
                    constraint: render::lossy(name),
                });
            }
            let mut columns: BTreeMap<Vec<u8>, usize> = BTreeMap::new();
            for (i, var) in vars.iter().enumerate() {
                if *var == b"*" {
                    continue;
                }
                if !is_variable(var) {
                    return Err(SchemaError::InvalidVariable {
                        variable: render::lossy(var),
                        constraint: render::lossy(name),
                    });
                }
                if columns.insert(var.to_vec(), i).is_some() {
                    return Err(SchemaError::DuplicateVariable {
                        variable: render::lossy(var),
                        constraint: render::lossy(name),
                    });
                }
            }
            sides.push((relation.to_vec(), columns));
        }
        let (foreign_relation, foreign_columns) = sides.pop().expect("two sides");
        let (local_relation, local_columns) = sides.pop().expect("two sides");
        if !local_columns.keys().eq(foreign_columns.keys()) {
            return Err(SchemaError::AsymmetricSides {
                constraint: render::lossy(name),
            });
        }
        schema.reference_of.insert(
            name.clone(),
            ReferenceConstraint {
                local_relation,
                local_columns: local_columns.into_values().collect(),
                foreign_relation,
                foreign_columns: foreign_columns.into_values().collect(),
            },
        );
    }

    // Resolution pass 5: derived per-relation datatype lists. Unknown
    // domains in TABLE declarations surface here.
    for (relation, columns) in &schema.domains_of_relation {
        let mut datatypes = Vec::with_capacity(columns.len());
        for domain in columns {
            let datatype = schema.datatype_of_domain.get(domain).ok_or_else(|| {
                SchemaError::UnknownDomain {
                    relation: render::lossy(relation),
                    domain: render::lossy(domain),
                }
            })?;
            datatypes.push(datatype.clone());
        }
        schema
            .datatypes_of_relation
            .insert(relation.clone(), datatypes);
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{DatatypeError, SyntaxKind};
    use std::sync::Arc;

    const PEOPLE: &[u8] = b"\
DOMAIN Person Atom
DOMAIN PersonDesc String
DOMAIN Gender Enum male female

TABLE Person Person Gender PersonDesc
TABLE Friends Person Person
";

    #[test]
    fn test_compile_example_schema() {
        let schema = Schema::compile(PEOPLE).unwrap();
        let domains: Vec<&[u8]> = schema.domains().collect();
        assert_eq!(domains, [&b"Gender"[..], b"Person", b"PersonDesc"]);
        let relations: Vec<&[u8]> = schema.relations().collect();
        assert_eq!(relations, [&b"Friends"[..], b"Person"]);
        assert_eq!(schema.arity(b"Person"), Some(3));
        assert_eq!(schema.arity(b"Friends"), Some(2));
        assert_eq!(
            schema.domains_of_relation(b"Person").unwrap(),
            [b"Person".to_vec(), b"Gender".to_vec(), b"PersonDesc".to_vec()]
        );
        assert_eq!(schema.source(), PEOPLE);
    }

    #[test]
    fn test_derived_datatypes_match_domain_datatypes() {
        let schema = Schema::compile(PEOPLE).unwrap();
        for relation in [&b"Person"[..], b"Friends"] {
            let domains = schema.domains_of_relation(relation).unwrap().to_vec();
            let datatypes = schema.datatypes_of_relation(relation).unwrap();
            for (domain, datatype) in domains.iter().zip(datatypes) {
                let by_domain = schema.datatype_of_domain(domain).unwrap();
                assert!(Arc::ptr_eq(datatype, by_domain));
            }
        }
    }

    #[test]
    fn test_datatype_syntax_resolution() {
        let schema = Schema::compile(PEOPLE).unwrap();
        let datatypes = schema.datatypes_of_relation(b"Person").unwrap();
        assert_eq!(datatypes[0].syntax(), SyntaxKind::Atom);
        assert_eq!(datatypes[1].syntax(), SyntaxKind::Atom);
        assert_eq!(datatypes[2].syntax(), SyntaxKind::String);
    }

    #[test]
    fn test_source_lines_are_retained() {
        let schema = Schema::compile(PEOPLE).unwrap();
        assert_eq!(schema.source_of_domain(b"Gender").unwrap(), b"Enum male female");
        assert_eq!(
            schema.source_of_relation(b"Friends").unwrap(),
            b"Person Person"
        );
    }

    #[test]
    fn test_duplicate_domain_rejected() {
        let err = Schema::compile(b"DOMAIN P Atom\nDOMAIN P String\n").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::AlreadyDeclared { kind: "domain", .. }
        ));
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let err =
            Schema::compile(b"DOMAIN P Atom\nTABLE T P\nTABLE T P P\n").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::AlreadyDeclared { kind: "table", .. }
        ));
    }

    #[test]
    fn test_unknown_datatype() {
        let err = Schema::compile(b"DOMAIN P Decimal\n").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownDatatype { .. }));
    }

    #[test]
    fn test_datatype_argument_error_propagates() {
        let err = Schema::compile(b"DOMAIN P Atom extra\n").unwrap_err();
        assert!(matches!(err, SchemaError::Datatype(DatatypeError::Args { .. })));
    }

    #[test]
    fn test_unknown_domain_in_table() {
        let err = Schema::compile(b"DOMAIN P Atom\nTABLE T P Q\n").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownDomain { .. }));
    }

    #[test]
    fn test_bare_declarations_are_malformed() {
        assert!(matches!(
            Schema::compile(b"DOMAIN P\n").unwrap_err(),
            SchemaError::Malformed { .. }
        ));
        assert!(matches!(
            Schema::compile(b"TABLE T\n").unwrap_err(),
            SchemaError::Malformed { .. }
        ));
        assert!(matches!(
            Schema::compile(b"KEY\n").unwrap_err(),
            SchemaError::Malformed { .. }
        ));
    }

    #[test]
    fn test_unknown_directives_ignored() {
        let schema =
            Schema::compile(b"DOMAIN P Atom\nTABLE T P\nCOMMENT anything goes\n").unwrap();
        assert!(schema.has_relation(b"T"));
    }

    #[test]
    fn test_key_with_wildcards() {
        let schema =
            Schema::compile(b"DOMAIN P Atom\nTABLE T P P P\nKEY T x * y\n").unwrap();
        let key = schema.key(b"T x * y").unwrap();
        assert_eq!(key.relation, b"T");
        assert_eq!(key.columns, [0, 2]);
    }

    #[test]
    fn test_key_all_wildcards_has_empty_projection() {
        let schema = Schema::compile(b"DOMAIN P Atom\nTABLE T P P\nKEY T * *\n").unwrap();
        assert_eq!(schema.key(b"T * *").unwrap().columns, Vec::<usize>::new());
    }

    #[test]
    fn test_key_unknown_table() {
        let err = Schema::compile(b"DOMAIN P Atom\nTABLE T P\nKEY U x\n").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTable { .. }));
    }

    #[test]
    fn test_key_arity_mismatch() {
        let err = Schema::compile(b"DOMAIN P Atom\nTABLE T P P\nKEY T x\n").unwrap_err();
        assert!(matches!(err, SchemaError::ArityMismatch { .. }));
    }

    #[test]
    fn test_key_duplicate_variable() {
        let err = Schema::compile(b"DOMAIN P Atom\nTABLE T P P\nKEY T x x\n").unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateVariable { .. }));
    }

    #[test]
    fn test_key_invalid_variable() {
        let err = Schema::compile(b"DOMAIN P Atom\nTABLE T P P\nKEY T x 1y\n").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidVariable { .. }));
        let err = Schema::compile(b"DOMAIN P Atom\nTABLE T P P\nKEY T x _y\n").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidVariable { .. }));
    }

    #[test]
    fn test_alphanumeric_variables_allowed() {
        let schema = Schema::compile(b"DOMAIN P Atom\nTABLE T P P\nKEY T a1 b2\n").unwrap();
        assert_eq!(schema.key(b"T a1 b2").unwrap().columns, [0, 1]);
    }

    #[test]
    fn test_reference_basic() {
        let schema = Schema::compile(
            b"DOMAIN P Atom\nTABLE A P\nTABLE B P\nREFERENCE B x => A x\n",
        )
        .unwrap();
        let r = schema.reference(b"B x => A x").unwrap();
        assert_eq!(r.local_relation, b"B");
        assert_eq!(r.local_columns, [0]);
        assert_eq!(r.foreign_relation, b"A");
        assert_eq!(r.foreign_columns, [0]);
    }

    #[test]
    fn test_reference_aligns_columns_by_variable_name() {
        // Local side declares (x, y); foreign side declares (y, x). After
        // sorting by variable name, position 0 is x on both sides.
        let schema = Schema::compile(
            b"DOMAIN P Atom\nTABLE A P P\nTABLE B P P\nREFERENCE A x y => B y x\n",
        )
        .unwrap();
        let r = schema.reference(b"A x y => B y x").unwrap();
        assert_eq!(r.local_columns, [0, 1]);
        assert_eq!(r.foreign_columns, [1, 0]);
    }

    #[test]
    fn test_reference_with_wildcards() {
        let schema = Schema::compile(
            b"DOMAIN P Atom\nTABLE A P P\nTABLE B P\nREFERENCE A x * => B x\n",
        )
        .unwrap();
        let r = schema.reference(b"A x * => B x").unwrap();
        assert_eq!(r.local_columns, [0]);
        assert_eq!(r.foreign_columns, [0]);
    }

    #[test]
    fn test_reference_missing_arrow() {
        let err =
            Schema::compile(b"DOMAIN P Atom\nTABLE A P\nREFERENCE A x A x\n").unwrap_err();
        assert!(matches!(err, SchemaError::MalformedReference { .. }));
    }

    #[test]
    fn test_reference_double_arrow() {
        let err = Schema::compile(
            b"DOMAIN P Atom\nTABLE A P\nTABLE B P\nREFERENCE A x => B x => A x\n",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MalformedReference { .. }));
    }

    #[test]
    fn test_reference_asymmetric_sides() {
        let err = Schema::compile(
            b"DOMAIN P Atom\nTABLE A P\nTABLE B P\nREFERENCE A x => B y\n",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::AsymmetricSides { .. }));
    }

    #[test]
    fn test_reference_unknown_table() {
        let err = Schema::compile(b"DOMAIN P Atom\nTABLE A P\nREFERENCE A x => C x\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTable { .. }));
    }

    #[test]
    fn test_crlf_and_blank_lines_tolerated() {
        let schema = Schema::compile(b"DOMAIN P Atom\r\n\r\nTABLE T P\r\n").unwrap();
        assert!(schema.has_relation(b"T"));
        assert_eq!(schema.source_of_relation(b"T").unwrap(), b"P");
    }

    #[test]
    fn test_custom_registry() {
        let mut registry = DatatypeRegistry::builtin();
        registry.register(
            b"Flag",
            Box::new(|args| crate::datatype::builtin::enum_factory(args)),
        );
        let schema =
            Schema::compile_with(b"DOMAIN F Flag yes no\nTABLE T F\n", &registry).unwrap();
        assert_eq!(schema.datatypes_of_relation(b"T").unwrap().len(), 1);
    }
}
