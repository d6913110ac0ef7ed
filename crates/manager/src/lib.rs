pub mod error;
pub mod manager;
pub mod replay;
pub mod sink;
