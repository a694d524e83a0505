// Client-supplied arguments and their compilation into query predicates

pub mod filter;
pub mod order_by;
pub mod relations;

pub use filter::WhereCompiler;
pub use order_by::{compile_order_by, OrderByRule};
pub use relations::{join_relation, relation_path_to_var_name, relation_path_to_var_path};

use serde_json::{Map, Value};

/// Nested filter tree: field filters, or a single `AND`/`OR` list.
pub type WhereArgument = Map<String, Value>;

/// Equality on columns expected to match at most one row.
pub type UniqueWhereArgument = Map<String, Value>;

/// Create or update payload: plain values plus relation writes.
pub type DataArgument = Map<String, Value>;

pub type OrderByArgument = Vec<OrderByRule>;
