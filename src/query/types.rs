use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Comparison operator attached to one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl CmpOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::Nin => "$nin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "$and",
            Self::Or => "$or",
        }
    }
}

/// `field op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: CmpOp,
    pub value: Bson,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Cond(Condition),
    /// Binary node; `left` is the clause that existed before the combine.
    Group { combinator: Combinator, left: Clause, right: Clause },
}

/// Ordered filter clause: a flat list of conditions, or a single combinator node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clause {
    pub terms: Vec<Term>,
}

impl Clause {
    #[must_use]
    pub fn group(combinator: Combinator, left: Self, right: Self) -> Self {
        Self { terms: vec![Term::Group { combinator, left, right }] }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Conditions of a flat clause, in order. Group terms are skipped.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.terms.iter().filter_map(|t| match t {
            Term::Cond(c) => Some(c),
            Term::Group { .. } => None,
        })
    }

    /// The combinator node if this clause is one.
    #[must_use]
    pub fn as_group(&self) -> Option<(Combinator, &Self, &Self)> {
        match self.terms.as_slice() {
            [Term::Group { combinator, left, right }] => Some((*combinator, left, right)),
            _ => None,
        }
    }

    /// Nesting depth: a flat clause is 1, each combine adds one level.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.terms
            .iter()
            .map(|t| match t {
                Term::Cond(_) => 1,
                Term::Group { left, right, .. } => 1 + left.depth().max(right.depth()),
            })
            .max()
            .unwrap_or(0)
    }

    /// Renders the clause as a filter document. Conditions on the same field are
    /// merged into one operator document (`{"age": {"$gte": 18, "$lt": 65}}`).
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut out = Document::new();
        for term in &self.terms {
            match term {
                Term::Cond(c) => {
                    if let Some(Bson::Document(ops)) = out.get_mut(&c.field) {
                        ops.insert(c.op.as_str(), c.value.clone());
                    } else {
                        let mut ops = Document::new();
                        ops.insert(c.op.as_str(), c.value.clone());
                        out.insert(c.field.clone(), ops);
                    }
                }
                Term::Group { combinator, left, right } => {
                    let branches = vec![Bson::Document(left.to_document()), Bson::Document(right.to_document())];
                    out.insert(combinator.as_str(), branches);
                }
            }
        }
        out
    }
}

impl From<&Clause> for Document {
    fn from(c: &Clause) -> Self {
        c.to_document()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Include,
    Exclude,
}

impl Visibility {
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Include => 1,
            Self::Exclude => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    pub field: String,
    pub visibility: Visibility,
}

pub(crate) fn sort_document(specs: &[SortSpec]) -> Document {
    let mut out = Document::new();
    for s in specs {
        out.insert(s.field.clone(), s.order.as_i32());
    }
    out
}

pub(crate) fn projection_document(specs: &[ProjectionSpec]) -> Document {
    let mut out = Document::new();
    for p in specs {
        out.insert(p.field.clone(), p.visibility.as_i32());
    }
    out
}

/// Find-and-modify request for [`Query::apply`](crate::query::Query::apply).
///
/// `remove` wins over `replace`; with neither set the payload is an update
/// made of `$` operators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Change {
    pub update: Document,
    pub replace: bool,
    pub remove: bool,
    pub upsert: bool,
    pub return_new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMode {
    Update,
    Replace,
    Remove,
}

impl Change {
    #[must_use]
    pub fn update(update: Document) -> Self {
        Self { update, ..Self::default() }
    }

    #[must_use]
    pub fn replace(replacement: Document) -> Self {
        Self { update: replacement, replace: true, ..Self::default() }
    }

    #[must_use]
    pub fn remove() -> Self {
        Self { remove: true, ..Self::default() }
    }

    #[must_use]
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    #[must_use]
    pub fn return_new(mut self, return_new: bool) -> Self {
        self.return_new = return_new;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> ChangeMode {
        if self.remove {
            ChangeMode::Remove
        } else if self.replace {
            ChangeMode::Replace
        } else {
            ChangeMode::Update
        }
    }
}
