// Service module - COMMAND SURFACE
// The in-process API the messaging front end and the daemon call

mod custodian;

pub use custodian::{Custodian, ServiceError, ACCOUNT_LABEL_PREFIX};
