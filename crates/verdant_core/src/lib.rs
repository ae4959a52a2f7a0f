pub mod api;
pub mod criteria;
pub mod descriptor;
pub mod error;
pub mod time;
pub mod value;

pub use api::*;
pub use criteria::{Criteria, SortDirection, SortTerm};
pub use descriptor::*;
pub use error::{VerdantError, VerdantResult};
pub use time::Timestamp;
pub use value::Value;
