use tessel_ir::Device;

/// Settings for a [`Pipeline`](crate::Pipeline) run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Re-check well-formedness of every function after each pass.
    pub verify_each: bool,
    /// Alignment in bytes of storage blocks created by memory lowering.
    pub storage_alignment: u64,
    /// Device that lowered allocations target.
    pub device: Device,
    /// Base name of the scalar functions generated by shape lowering.
    pub shape_func_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verify_each: false,
            storage_alignment: 64,
            device: Device::CPU,
            shape_func_name: "shape_func".to_owned(),
        }
    }
}

impl PipelineConfig {
    /// Environment variable that turns on per-pass verification.
    pub const VERIFY_ENV: &'static str = "TESSEL_VERIFY_PASSES";

    /// Defaults, with `verify_each` taken from `TESSEL_VERIFY_PASSES`.
    pub fn from_env() -> Self {
        let value = std::env::var(Self::VERIFY_ENV).ok();
        Self {
            verify_each: flag_enabled(value.as_deref()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_verify_each(mut self, verify_each: bool) -> Self {
        self.verify_each = verify_each;
        self
    }
}

/// Any non-empty value other than `0` enables a flag.
fn flag_enabled(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some(v) if !v.is_empty() && v != "0")
}
