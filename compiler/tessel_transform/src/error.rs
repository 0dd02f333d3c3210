use tessel_ir::{BuildError, WellFormedError};

/// Error raised by a lowering pass or the pipeline.
///
/// `binding` indices count bindings across all blocks of the function, in
/// program order, starting from 0.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PassError {
    #[error("malformed call at binding {binding} of `{function}`: {reason}")]
    MalformedCall {
        function: String,
        binding: usize,
        reason: String,
    },

    #[error("dataflow var `{var}` in `{function}` was not converted to a plain var")]
    UnconvertedDataflowVar { function: String, var: String },

    #[error("shape variable `{var}` in `{function}` is not bound by a parameter or match_shape")]
    UnboundShapeVar { function: String, var: String },

    #[error("shape variable `{var}` in `{function}` is read before its value is stored")]
    ShapeVarNotReady { function: String, var: String },

    #[error("rebuilding `{function}` failed")]
    Build {
        function: String,
        #[source]
        source: BuildError,
    },

    #[error("IR check after pass `{pass}` failed")]
    Verify {
        pass: &'static str,
        #[source]
        source: WellFormedError,
    },
}

impl PassError {
    /// Adapter for `map_err` on builder results.
    pub(crate) fn build(function: &str) -> impl FnOnce(BuildError) -> PassError + '_ {
        move |source| PassError::Build {
            function: function.to_owned(),
            source,
        }
    }

    pub(crate) fn malformed(function: &str, binding: usize, reason: impl Into<String>) -> Self {
        PassError::MalformedCall {
            function: function.to_owned(),
            binding,
            reason: reason.into(),
        }
    }
}
