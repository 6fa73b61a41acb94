pub mod detail;
pub mod search;
pub mod text;

pub use detail::{parse_grant_details, DetailValue, GrantDetail};
pub use search::{parse_search_results, GrantSummary};
