// Lambdacore - tagged values, lambda-list handlers, and argument binding
//
// The object-model and calling-convention substrate of a Lisp runtime:
// tagged immediate values with a heap for structured objects, lambda lists
// parsed once into reusable handlers with every binding target classified
// as a special variable or an indexed lexical slot, and a binder that maps
// one call's actual arguments onto those targets through pluggable scopes.

pub mod arguments;
pub mod conditions;
pub mod context;
pub mod dynamic;
pub mod environment;
pub mod frame;
pub mod heap;
pub mod lambda_list;
pub mod symbol;
pub mod types;

pub use arguments::{
    create_bindings_in_scope, EnvironmentScope, EvalHook, ScopeManager, StackFrameScope,
};
pub use conditions::{CallError, LambdaListError};
pub use context::RuntimeContext;
pub use environment::Environment;
pub use frame::{StackFrame, Vaslist};
pub use lambda_list::{LambdaListContext, LambdaListHandler};
pub use types::TaggedValue;
