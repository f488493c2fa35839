pub mod ledger;
pub mod server;
pub mod storage;
