//! 工具层：调用边界（ToolInvoker）、注册表、带超时与审计的执行器、内存版后台

pub mod backoffice;
pub mod executor;
pub mod invoker;
pub mod registry;

pub use backoffice::{register_backoffice_tools, Backoffice};
pub use executor::ToolExecutor;
pub use invoker::{ToolCall, ToolInvoker, ToolResult};
pub use registry::{Tool, ToolRegistry};
