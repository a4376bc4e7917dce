pub mod dap;
pub mod log;
pub mod remote;
pub mod session;
