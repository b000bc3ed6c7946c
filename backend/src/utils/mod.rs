pub mod encryption;
pub mod jwt;
pub mod keys;
pub mod password;
pub mod time;

pub use jwt::*;
pub use password::*;
pub use time::*;
