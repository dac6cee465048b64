pub mod tracker_stats;
