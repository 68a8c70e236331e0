pub mod deal;
pub mod interview;
pub mod report;
