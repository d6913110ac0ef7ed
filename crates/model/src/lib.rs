pub mod features;
pub mod handle;
pub mod logistic;
pub mod scheduler;
pub mod store;
