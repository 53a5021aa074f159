pub mod enums;
pub mod error;
pub mod extract;
pub mod pagination;
pub mod schema;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod utils;

pub use enums::*;
pub use error::{ApiError, ApiResult, FieldErrors};
pub use extract::{ApiJson, ApiQuery};
pub use state::AppState;
pub use pagination::{parse_ordering, Page, PageParams};
pub use utils::{create_conn, deserialize_some, slugify, with_conn, DbPool};
