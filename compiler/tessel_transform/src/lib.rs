//! Lowering passes for the Tessel compiler.
//!
//! This crate provides:
//!
//! - **The pass interface** ([`Pass`]) and a sequential [`Pipeline`] runner
//!   configured by [`PipelineConfig`].
//!
//! - **Five module-to-module passes**, in standard pipeline order:
//!   - [`FmaRewrite`]: fuse `add(multiply(a, b), c)` into `ewise_fma(a, b, c)`
//!     inside dataflow blocks.
//!   - [`ToNonDataflow`]: demote every dataflow block to a plain block with
//!     freshly allocated plain variables.
//!   - [`CallDpsRewrite`]: split `call_dps` into an explicit output
//!     allocation followed by a destination-passing extern call.
//!   - [`VmMemoryLower`]: lower abstract allocations to storage blocks plus
//!     tensor views, and `call_packed` to direct extern calls.
//!   - [`VmShapeLower`]: move symbolic shape values into a runtime shape heap
//!     and extract shape arithmetic into a generated scalar function.
//!
//! Every pass takes the module by reference and returns a new one. A failing
//! pass returns a [`PassError`] and produces no module.
//!
//! # Logging
//!
//! Passes log per function at `debug` and per rewrite at `trace`. Call
//! [`init_tracing`] to print them; filter with `RUST_LOG`.

mod call_dps_rewrite;
mod config;
mod error;
mod fma_rewrite;
mod pass;
mod rewrite;
mod to_non_dataflow;
mod vm_memory_lower;
mod vm_shape_lower;

#[cfg(test)]
mod test_helpers;
#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;

use std::sync::Once;

pub use call_dps_rewrite::CallDpsRewrite;
pub use config::PipelineConfig;
pub use error::PassError;
pub use fma_rewrite::FmaRewrite;
pub use pass::{Pass, Pipeline};
pub use to_non_dataflow::ToNonDataflow;
pub use vm_memory_lower::VmMemoryLower;
pub use vm_shape_lower::VmShapeLower;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for pass debug output.
///
/// Safe to call multiple times. Enable with
/// `RUST_LOG=tessel_transform=debug` or `RUST_LOG=tessel_transform=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
