pub mod common;
pub mod methods;
pub mod transform;
