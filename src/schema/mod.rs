//! Schema model
//!
//! A [`Schema`] is the compiled, immutable form of a schema text: the
//! declared identifier sets, the original single-line source of every
//! declaration (kept for diagnostics and re-serialization), the resolved
//! domain datatypes, each relation's column domains, and the key and
//! reference constraints with their column indices. It is produced once
//! by [`Schema::compile`] and read-only afterwards, so it can be shared
//! freely across threads.

pub mod compile;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

use crate::datatype::{Datatype, DatatypeError, DatatypeRegistry};

/// Errors raised while compiling a schema.
///
/// Compilation is fail-fast: the first error aborts it. Syntax problems
/// and unresolved names are separate variants so callers can distinguish
/// a malformed schema from one that is merely inconsistent.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse schema line \"{line}\"")]
    Malformed { line: String },

    #[error("could not parse \"{line}\" as REFERENCE constraint")]
    MalformedReference { line: String },

    #[error("{kind} \"{name}\" already declared")]
    AlreadyDeclared { kind: &'static str, name: String },

    #[error("datatype \"{datatype}\" not available while parsing DOMAIN \"{domain}\"")]
    UnknownDatatype { domain: String, datatype: String },

    #[error(transparent)]
    Datatype(#[from] DatatypeError),

    #[error("declaration of table \"{relation}\" references unknown domain \"{domain}\"")]
    UnknownDomain { relation: String, domain: String },

    #[error("no such table \"{relation}\" in constraint \"{constraint}\"")]
    UnknownTable { relation: String, constraint: String },

    #[error("arity mismatch for table \"{relation}\" in constraint \"{constraint}\"")]
    ArityMismatch { relation: String, constraint: String },

    #[error("variable \"{variable}\" used twice on the same side of constraint \"{constraint}\"")]
    DuplicateVariable { variable: String, constraint: String },

    #[error("invalid variable \"{variable}\" in constraint \"{constraint}\"")]
    InvalidVariable { variable: String, constraint: String },

    #[error("different variables on the two sides of \"=>\" in constraint \"{constraint}\"")]
    AsymmetricSides { constraint: String },
}

/// A uniqueness constraint: a projection of one relation that must be
/// duplicate-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConstraint {
    pub relation: Vec<u8>,
    /// Column indices of the named (non-wildcard) variables, in
    /// declaration order.
    pub columns: Vec<usize>,
}

/// A referential constraint: every local projection must also occur as a
/// foreign projection.
///
/// The two column lists are aligned by variable name: position `i` on the
/// local side corresponds to position `i` on the foreign side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceConstraint {
    pub local_relation: Vec<u8>,
    pub local_columns: Vec<usize>,
    pub foreign_relation: Vec<u8>,
    pub foreign_columns: Vec<usize>,
}

/// A compiled schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub(crate) source: Vec<u8>,
    pub(crate) domains: BTreeSet<Vec<u8>>,
    pub(crate) relations: BTreeSet<Vec<u8>>,
    pub(crate) keys: BTreeSet<Vec<u8>>,
    pub(crate) references: BTreeSet<Vec<u8>>,
    pub(crate) source_of_domain: BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) source_of_relation: BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) source_of_key: BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) source_of_reference: BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) datatype_of_domain: BTreeMap<Vec<u8>, Arc<dyn Datatype>>,
    pub(crate) domains_of_relation: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
    /// Derived: per-relation column datatypes, cached for the codec.
    pub(crate) datatypes_of_relation: BTreeMap<Vec<u8>, Vec<Arc<dyn Datatype>>>,
    pub(crate) key_of: BTreeMap<Vec<u8>, KeyConstraint>,
    pub(crate) reference_of: BTreeMap<Vec<u8>, ReferenceConstraint>,
}

impl Schema {
    /// Compile schema text using the built-in datatypes.
    pub fn compile(source: &[u8]) -> Result<Self, SchemaError> {
        Self::compile_with(source, &DatatypeRegistry::builtin())
    }

    /// Compile schema text against a caller-supplied datatype registry.
    pub fn compile_with(
        source: &[u8],
        registry: &DatatypeRegistry,
    ) -> Result<Self, SchemaError> {
        compile::compile(source, registry)
    }

    /// The original schema text.
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Declared domain names, sorted.
    pub fn domains(&self) -> impl Iterator<Item = &[u8]> {
        self.domains.iter().map(|n| n.as_slice())
    }

    /// Declared relation names, sorted.
    pub fn relations(&self) -> impl Iterator<Item = &[u8]> {
        self.relations.iter().map(|n| n.as_slice())
    }

    /// Declared key names, sorted. A key's name is its declaration text.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.keys.iter().map(|n| n.as_slice())
    }

    /// Declared reference names, sorted.
    pub fn references(&self) -> impl Iterator<Item = &[u8]> {
        self.references.iter().map(|n| n.as_slice())
    }

    pub fn has_relation(&self, name: &[u8]) -> bool {
        self.relations.contains(name)
    }

    /// Number of columns of a relation.
    pub fn arity(&self, relation: &[u8]) -> Option<usize> {
        self.domains_of_relation.get(relation).map(|d| d.len())
    }

    pub fn datatype_of_domain(&self, domain: &[u8]) -> Option<&Arc<dyn Datatype>> {
        self.datatype_of_domain.get(domain)
    }

    /// The ordered column domain names of a relation.
    pub fn domains_of_relation(&self, relation: &[u8]) -> Option<&[Vec<u8>]> {
        self.domains_of_relation.get(relation).map(|d| d.as_slice())
    }

    /// The ordered column datatypes of a relation.
    pub fn datatypes_of_relation(&self, relation: &[u8]) -> Option<&[Arc<dyn Datatype>]> {
        self.datatypes_of_relation
            .get(relation)
            .map(|d| d.as_slice())
    }

    pub fn key(&self, name: &[u8]) -> Option<&KeyConstraint> {
        self.key_of.get(name)
    }

    pub fn reference(&self, name: &[u8]) -> Option<&ReferenceConstraint> {
        self.reference_of.get(name)
    }

    pub fn source_of_domain(&self, domain: &[u8]) -> Option<&[u8]> {
        self.source_of_domain.get(domain).map(|s| s.as_slice())
    }

    pub fn source_of_relation(&self, relation: &[u8]) -> Option<&[u8]> {
        self.source_of_relation.get(relation).map(|s| s.as_slice())
    }

    pub fn source_of_key(&self, key: &[u8]) -> Option<&[u8]> {
        self.source_of_key.get(key).map(|s| s.as_slice())
    }

    pub fn source_of_reference(&self, reference: &[u8]) -> Option<&[u8]> {
        self.source_of_reference.get(reference).map(|s| s.as_slice())
    }

    /// The schema text as an inline header: every line prefixed with
    /// `% ` and newline-terminated, ready to prepend to a body.
    pub fn embed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.source.len() + 64);
        if self.source.is_empty() {
            return out;
        }
        let mut lines: Vec<&[u8]> = self.source.split(|b| *b == b'\n').collect();
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        for line in lines {
            out.extend_from_slice(b"% ");
            out.extend_from_slice(line);
            out.push(b'\n');
        }
        out
    }
}
