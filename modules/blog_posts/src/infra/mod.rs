pub mod change_feed;
pub mod storage;
