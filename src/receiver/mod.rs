pub mod sink;

pub use self::sink::*;
