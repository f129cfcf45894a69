pub mod process;
pub mod recommendation;
pub mod stock;
