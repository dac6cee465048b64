pub mod sweeper;
pub mod tracker;
