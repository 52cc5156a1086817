pub mod config;
pub mod reconcile;

use crate::metrics::ControllerId;

pub const CONTROLLER_ID: ControllerId = "virtualworkspace";
