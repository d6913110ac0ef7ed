pub mod builder;
pub mod evaluator;
pub mod judge;
pub mod ledger;
pub mod scorer;
