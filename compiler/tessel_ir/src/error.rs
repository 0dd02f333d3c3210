//! Errors raised while building or checking IR.

/// Violation of the IR's scoping and binding rules.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WellFormedError {
    #[error("block {block} of `{function}` has no bindings")]
    EmptyBlock { function: String, block: usize },

    #[error("`{var}` is used in `{function}` before it is defined")]
    UndefinedVar { function: String, var: String },

    #[error("variable id {raw} is not allocated in `{function}`")]
    UnknownVar { function: String, raw: u32 },

    #[error("shape variable id {raw} is not allocated in `{function}`")]
    UnknownShapeVar { function: String, raw: u32 },

    #[error("`{var}` is bound more than once in `{function}`")]
    Rebound { function: String, var: String },

    #[error("dataflow var `{var}` is used outside its dataflow block in `{function}`")]
    DataflowVarEscapes { function: String, var: String },

    #[error("dataflow var `{var}` is bound in a non-dataflow block of `{function}`")]
    DataflowVarInPlainBlock { function: String, var: String },
}

/// Error raised by [`FunctionBuilder`](crate::FunctionBuilder).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("`emit_output` called outside a dataflow block")]
    OutputOutsideDataflow,

    #[error("dataflow blocks cannot be nested")]
    NestedDataflow,

    #[error("dataflow block {block} has no output binding")]
    DataflowWithoutOutput { block: usize },

    #[error("dataflow var `{var}` cannot be bound outside a dataflow block")]
    DataflowVarOutsideDataflow { var: String },

    #[error("`{var}` is annotated with shape {expected} but its value has shape {found}")]
    ShapeMismatch {
        var: String,
        expected: String,
        found: String,
    },

    #[error("`{var}` is annotated with type {expected} but its value has type {found}")]
    TypeMismatch {
        var: String,
        expected: String,
        found: String,
    },

    #[error("variable id {raw} is not allocated in this builder")]
    UnknownVar { raw: u32 },

    #[error("cannot append an empty block")]
    EmptyBlock,

    #[error(transparent)]
    IllFormed(#[from] WellFormedError),
}
