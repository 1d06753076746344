mod audit_log;
mod license;
mod order;

pub use audit_log::*;
pub use license::*;
pub use order::*;
