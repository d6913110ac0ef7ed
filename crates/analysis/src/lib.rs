pub mod buffer;
pub mod displacement;
pub mod imbalance;
pub mod indicators;
pub mod liquidity;
pub mod state;
pub mod structure;
