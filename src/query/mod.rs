// Submodules for separation of concerns
mod builder;
mod cursor;
mod exec;
mod parse;
mod types;

pub use builder::FilterBuilder;
pub use cursor::Cursor;
pub use exec::Query;
pub use parse::{compile_filter, parse_select_field, parse_sort_field, split_operator};
pub use types::{
    Change, ChangeMode, Clause, CmpOp, Combinator, Condition, Order, ProjectionSpec, SortSpec, Term, Visibility,
};
