use bson::{Bson, Document};

use super::parse::compile_filter;
use super::types::{Clause, Combinator};

/// Accumulates `where_` / `and_where` / `or_where` calls into one clause.
///
/// `where_` appends to the current clause. `and_where` / `or_where` wrap the
/// current clause and the new conditions in a two-element combinator node, so
/// repeated combines nest to the left.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterBuilder {
    filter: Option<Clause>,
}

impl FilterBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn where_<I, K, V>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Bson>,
    {
        let compiled = compile_filter(conditions);
        match &mut self.filter {
            Some(existing) => existing.terms.extend(compiled.terms),
            None => self.filter = Some(compiled),
        }
        self
    }

    #[must_use]
    pub fn and_where<I, K, V>(self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Bson>,
    {
        self.combine(Combinator::And, conditions)
    }

    #[must_use]
    pub fn or_where<I, K, V>(self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Bson>,
    {
        self.combine(Combinator::Or, conditions)
    }

    fn combine<I, K, V>(mut self, combinator: Combinator, conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Bson>,
    {
        match self.filter.take() {
            None => self.where_(conditions),
            Some(previous) => {
                self.filter = Some(Clause::group(combinator, previous, compile_filter(conditions)));
                self
            }
        }
    }

    /// `None` until the first `where_`-family call.
    #[must_use]
    pub const fn clause(&self) -> Option<&Clause> {
        self.filter.as_ref()
    }

    /// Filter document sent to the driver; empty (match everything) when unset.
    #[must_use]
    pub fn to_document(&self) -> Document {
        self.filter.as_ref().map(Clause::to_document).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn combine_without_filter_acts_like_where() {
        let a = FilterBuilder::new().and_where(doc! {"x": 1});
        let b = FilterBuilder::new().where_(doc! {"x": 1});
        assert_eq!(a, b);
        let c = FilterBuilder::new().or_where(doc! {"x": 1});
        assert_eq!(c, b);
    }

    #[test]
    fn where_appends_to_existing_conditions() {
        let f = FilterBuilder::new().where_(doc! {"a": 1}).where_(doc! {"b >": 2});
        assert_eq!(f.to_document(), doc! {"a": {"$eq": 1}, "b": {"$gt": 2}});
    }

    #[test]
    fn repeated_combines_nest_left() {
        let f = FilterBuilder::new()
            .where_(doc! {"a": 1})
            .and_where(doc! {"b": 2})
            .or_where(doc! {"c": 3});
        assert_eq!(
            f.to_document(),
            doc! {"$or": [
                {"$and": [{"a": {"$eq": 1}}, {"b": {"$eq": 2}}]},
                {"c": {"$eq": 3}},
            ]}
        );
        assert_eq!(f.clause().map(Clause::depth), Some(3));
    }

    #[test]
    fn unset_filter_renders_empty() {
        assert_eq!(FilterBuilder::new().to_document(), Document::new());
        assert!(FilterBuilder::new().clause().is_none());
    }
}
