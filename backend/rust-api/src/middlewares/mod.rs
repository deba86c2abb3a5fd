pub mod metrics;
pub mod request_gate;
pub mod trace;
