pub mod congestion;
pub mod tcp;
pub mod utils;
pub use self::tcp::*;
