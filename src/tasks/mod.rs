pub mod comms;
pub mod control;
