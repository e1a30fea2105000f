pub mod model;
pub mod price;
pub mod tier;
