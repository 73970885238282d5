pub mod codec;
pub mod cursor;
pub mod header;
pub mod matcher;

pub use codec::*;
pub use cursor::*;
pub use header::*;
pub use matcher::*;
