use std::ops::{Deref, DerefMut};

use super::FunctionBuilder;
use crate::BuildError;

/// Guard for an open dataflow block.
///
/// Dereferences to the [`FunctionBuilder`], so bindings are emitted through
/// it directly. The block closes on [`finish`](Self::finish) or when the
/// guard is dropped. A dropped guard cannot return its validation error, so
/// the error is held by the builder and returned from
/// [`FunctionBuilder::finish`].
pub struct DataflowScope<'b> {
    builder: &'b mut FunctionBuilder,
    closed: bool,
}

impl<'b> DataflowScope<'b> {
    pub(super) fn new(builder: &'b mut FunctionBuilder) -> Self {
        Self {
            builder,
            closed: false,
        }
    }

    /// Close the block, reporting a missing output immediately.
    pub fn finish(mut self) -> Result<(), BuildError> {
        self.closed = true;
        self.builder.close_dataflow()
    }
}

impl Deref for DataflowScope<'_> {
    type Target = FunctionBuilder;

    fn deref(&self) -> &FunctionBuilder {
        self.builder
    }
}

impl DerefMut for DataflowScope<'_> {
    fn deref_mut(&mut self) -> &mut FunctionBuilder {
        self.builder
    }
}

impl Drop for DataflowScope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.builder.close_dataflow() {
                self.builder.defer(err);
            }
        }
    }
}
