//! # Item Error Classification
//!
//! Maps an item failure to one of three handling strategies: retry the
//! operation, skip the item, or abort the step.
//!
//! ## Error kinds
//!
//! Failures carry an [`ErrorKind`] drawn from a declared hierarchy
//! ([`KindHierarchy`]). Every kind has exactly one parent and all chains end
//! at [`ErrorKind::ROOT`]. A kind nobody declared is treated as a direct child
//! of the root.
//!
//! ## Resolution
//!
//! A [`KindClassifier`] holds an ordered table of `(kind, classification)`
//! rules. Classifying walks the failing kind's ancestry from the kind itself
//! towards the root and returns the first ancestor that has a rule, so the
//! most specific rule always wins. When one kind has several rules the first
//! registered wins. With no match the configured default applies.
//!
//! ```text
//! error ─┬─ transient ─┬─ timeout
//!        │             └─ contention
//!        └─ data ──────┬─ validation
//!                      └─ parse
//! ```
//!
//! Classifiers are immutable after construction and can be shared freely
//! between concurrently running chunks.

use crate::item::ItemError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

static ROOT_KIND: ErrorKind = ErrorKind::from_static("error");

/// Name of an error category within a [`KindHierarchy`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorKind(Cow<'static, str>);

impl ErrorKind {
    /// Ancestor of every kind
    pub const ROOT: ErrorKind = ErrorKind::from_static("error");
    pub const TRANSIENT: ErrorKind = ErrorKind::from_static("transient");
    pub const TIMEOUT: ErrorKind = ErrorKind::from_static("timeout");
    pub const CONTENTION: ErrorKind = ErrorKind::from_static("contention");
    pub const DATA: ErrorKind = ErrorKind::from_static("data");
    pub const VALIDATION: ErrorKind = ErrorKind::from_static("validation");
    pub const PARSE: ErrorKind = ErrorKind::from_static("parse");
    pub const RESOURCE: ErrorKind = ErrorKind::from_static("resource");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.as_str() == Self::ROOT.as_str()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ErrorKind {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for ErrorKind {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// How a failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Re-invoke the same item-level operation
    Retryable,
    /// Drop the offending item and continue
    Skippable,
    /// Abort the step
    Fatal,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Retryable => write!(f, "retryable"),
            Classification::Skippable => write!(f, "skippable"),
            Classification::Fatal => write!(f, "fatal"),
        }
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retryable" => Ok(Self::Retryable),
            "skippable" => Ok(Self::Skippable),
            "fatal" => Ok(Self::Fatal),
            _ => Err(format!("Invalid classification: {s}")),
        }
    }
}

/// Errors raised while declaring the kind hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    #[error("Error kind '{kind}' cannot be redeclared under a different parent")]
    ConflictingDeclaration { kind: String },

    #[error("Parent kind '{parent}' of '{kind}' has not been declared")]
    UnknownParent { kind: String, parent: String },

    #[error("The root kind cannot be declared with a parent")]
    RootRedeclared,
}

/// Declared set of error kinds and their parent links.
///
/// Parents must be declared before their children, which makes cycles
/// impossible by construction.
#[derive(Debug, Clone)]
pub struct KindHierarchy {
    parents: HashMap<ErrorKind, ErrorKind>,
}

impl KindHierarchy {
    /// Hierarchy holding only the root kind
    pub fn empty() -> Self {
        Self {
            parents: HashMap::new(),
        }
    }

    /// The built-in kinds used by [`ItemError`] constructors
    pub fn standard() -> Self {
        let mut hierarchy = Self::empty();
        let builtin = [
            (ErrorKind::TRANSIENT, ErrorKind::ROOT),
            (ErrorKind::TIMEOUT, ErrorKind::TRANSIENT),
            (ErrorKind::CONTENTION, ErrorKind::TRANSIENT),
            (ErrorKind::DATA, ErrorKind::ROOT),
            (ErrorKind::VALIDATION, ErrorKind::DATA),
            (ErrorKind::PARSE, ErrorKind::DATA),
            (ErrorKind::RESOURCE, ErrorKind::ROOT),
        ];
        for (kind, parent) in builtin {
            hierarchy.parents.insert(kind, parent);
        }
        hierarchy
    }

    /// Declare `kind` as a child of `parent`
    pub fn declare(
        &mut self,
        kind: impl Into<ErrorKind>,
        parent: impl Into<ErrorKind>,
    ) -> Result<(), ClassifierError> {
        let kind = kind.into();
        let parent = parent.into();

        if kind.is_root() {
            return Err(ClassifierError::RootRedeclared);
        }
        if !self.is_declared(&parent) {
            return Err(ClassifierError::UnknownParent {
                kind: kind.to_string(),
                parent: parent.to_string(),
            });
        }
        match self.parents.get(&kind) {
            Some(existing) if existing == &parent => Ok(()),
            Some(_) => Err(ClassifierError::ConflictingDeclaration {
                kind: kind.to_string(),
            }),
            None => {
                self.parents.insert(kind, parent);
                Ok(())
            }
        }
    }

    pub fn is_declared(&self, kind: &ErrorKind) -> bool {
        kind.is_root() || self.parents.contains_key(kind)
    }

    pub fn parent(&self, kind: &ErrorKind) -> Option<&ErrorKind> {
        if kind.is_root() {
            return None;
        }
        Some(self.parents.get(kind).unwrap_or(&ROOT_KIND))
    }

    /// The kind followed by each of its ancestors, ending with the root
    pub fn ancestry(&self, kind: &ErrorKind) -> Vec<ErrorKind> {
        let mut chain = vec![kind.clone()];
        let mut current = kind;
        while let Some(parent) = self.parent(current) {
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// True when `ancestor` is `kind` itself or one of its ancestors
    pub fn is_a(&self, kind: &ErrorKind, ancestor: &ErrorKind) -> bool {
        self.ancestry(kind).iter().any(|k| k == ancestor)
    }
}

impl Default for KindHierarchy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Strategy that decides how a failure is handled
pub trait Classifier: Send + Sync {
    fn classify_kind(&self, kind: &ErrorKind) -> Classification;

    fn classify(&self, error: &ItemError) -> Classification {
        self.classify_kind(error.kind())
    }
}

/// Table-driven classifier with most-specific-ancestor resolution
#[derive(Debug, Clone)]
pub struct KindClassifier {
    hierarchy: KindHierarchy,
    rules: Vec<(ErrorKind, Classification)>,
    default: Classification,
}

impl KindClassifier {
    pub fn builder(hierarchy: KindHierarchy) -> KindClassifierBuilder {
        KindClassifierBuilder {
            hierarchy,
            rules: Vec::new(),
            default: Classification::Fatal,
        }
    }

    /// Classifier that treats every failure the same way
    pub fn uniform(classification: Classification) -> Self {
        Self {
            hierarchy: KindHierarchy::standard(),
            rules: Vec::new(),
            default: classification,
        }
    }

    pub fn hierarchy(&self) -> &KindHierarchy {
        &self.hierarchy
    }

    pub fn rules(&self) -> &[(ErrorKind, Classification)] {
        &self.rules
    }

    pub fn default_classification(&self) -> Classification {
        self.default
    }
}

impl Classifier for KindClassifier {
    fn classify_kind(&self, kind: &ErrorKind) -> Classification {
        for ancestor in self.hierarchy.ancestry(kind) {
            if let Some((_, classification)) = self.rules.iter().find(|(k, _)| *k == ancestor) {
                return *classification;
            }
        }
        self.default
    }
}

#[derive(Debug)]
pub struct KindClassifierBuilder {
    hierarchy: KindHierarchy,
    rules: Vec<(ErrorKind, Classification)>,
    default: Classification,
}

impl KindClassifierBuilder {
    pub fn rule(mut self, kind: impl Into<ErrorKind>, classification: Classification) -> Self {
        self.rules.push((kind.into(), classification));
        self
    }

    pub fn default_classification(mut self, classification: Classification) -> Self {
        self.default = classification;
        self
    }

    /// Fails if a rule names a kind the hierarchy does not declare
    pub fn build(self) -> Result<KindClassifier, ClassifierError> {
        for (kind, _) in &self.rules {
            if !self.hierarchy.is_declared(kind) {
                return Err(ClassifierError::UnknownParent {
                    kind: kind.to_string(),
                    parent: "<undeclared>".to_string(),
                });
            }
        }
        Ok(KindClassifier {
            hierarchy: self.hierarchy,
            rules: self.rules,
            default: self.default,
        })
    }
}
