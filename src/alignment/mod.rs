pub mod greedy;
pub mod join;
pub mod report;
