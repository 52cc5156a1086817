pub mod controller;
pub mod predicate;
pub mod reconcile;
