pub mod app_limited;
pub mod pattern;

pub use self::app_limited::*;
pub use self::pattern::*;
