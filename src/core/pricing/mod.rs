pub mod matcher;
pub mod quota;
pub mod resolver;
pub mod units;
