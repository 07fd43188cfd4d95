pub mod builtin;
pub mod context;
pub mod normalize;
pub mod registry;
pub mod traits;

pub use builtin::register_store_tools;
pub use context::{SubjectKind, ToolContext};
pub use normalize::{normalize_input, Placeholder};
pub use registry::{ToolFilter, ToolRegistry};
pub use traits::{BoxedHandlerFuture, FnTool, FunctionDeclaration, Tool};
