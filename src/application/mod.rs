pub mod catalog;
pub mod display;
pub mod polling;
