pub mod codec;
pub mod convert;
pub mod types;

pub use self::codec::*;
pub use self::convert::*;
pub use self::types::*;
