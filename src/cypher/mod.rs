//! Cypher statement construction.

mod escape;
mod load;
mod statement;

pub use escape::{escape_identifier, is_valid_identifier, property};
pub use load::{
    delete_statement, Comparison, Filter, LoadQuery, Order, Pagination, WhereBuilder,
};
pub use statement::{Statement, StatementKind};
