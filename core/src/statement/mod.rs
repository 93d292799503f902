//! SQL statement generators.
//!
//! Each statement is a small value that writes itself into a
//! [`QueryBuilder`](crate::QueryBuilder) through the [`Query`](crate::Query)
//! trait. Statements chain the way the SQL reads:
//!
//! ```
//! use sqlweave_core::statement::Select;
//! use sqlweave_core::{Query, column};
//!
//! let select = Select::new(["name"])
//!     .from("T")
//!     .where_(column("name").is("test"));
//! assert_eq!(select.query().unwrap(), "SELECT `name` FROM `T` WHERE `name`='test'");
//! ```

mod delete;
mod from;
mod index;
mod insert;
mod join;
mod select;
mod trigger;
mod update;
mod where_clause;

pub use delete::Delete;
pub use from::FromClause;
pub use index::Index;
pub use insert::Insert;
pub use join::{Join, JoinType};
pub use select::{Method, Qualifier, ResultColumn, Select};
pub use trigger::{CompletedTrigger, Trigger, TriggerEvent, TriggerMethod, TriggerTiming};
pub use update::{Set, Update};
pub use where_clause::{OrderBy, Where};
