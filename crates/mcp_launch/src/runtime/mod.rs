//! Runtime components for process supervision

pub mod command;
pub mod monitor;
pub mod output;
pub mod process;
pub mod registry;
pub mod shutdown;
pub mod supervisor;

pub use command::*;
pub use monitor::*;
pub use output::*;
pub use process::*;
pub use registry::*;
pub use shutdown::*;
pub use supervisor::*;
