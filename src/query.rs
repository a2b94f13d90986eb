//! Query interpretation: extraction, escaping, boosts and request assembly.

pub mod assembled;
pub mod boost;
pub mod builder;
pub mod clause;
pub mod escaper;
pub mod extractor;
pub mod parsed;

pub use assembled::{AssembledQuery, Filter, IndexSelector, TextQuery};
pub use boost::BoostSpec;
pub use builder::QueryBuilder;
pub use clause::{Clause, Keyword};
pub use escaper::Escaper;
pub use extractor::{Extractor, StageContext};
pub use parsed::{ParsedQuery, RawQuery, SortMode};
