pub mod processing;
pub mod schema;
pub mod stats;
pub mod store;
pub mod types;

pub use self::processing::*;
pub use self::stats::*;
pub use self::store::*;
pub use self::types::*;
