pub mod rescan;
pub mod serve;
