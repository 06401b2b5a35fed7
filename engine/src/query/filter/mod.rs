//! Filter DSL: parsing, operators and compilation

mod builder;
mod comparison;
mod parser;
mod types;

pub use builder::WhereBuilder;
pub use comparison::{Operator, resolve};
pub use parser::{parse_filter, parse_filter_str};
pub use types::{Comparison, FieldCondition, FieldFilter, FilterNode, GroupKind};
