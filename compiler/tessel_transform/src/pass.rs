use tessel_ir::{well_formed, Module};

use crate::{
    CallDpsRewrite, FmaRewrite, PassError, PipelineConfig, ToNonDataflow, VmMemoryLower,
    VmShapeLower,
};

/// A module-to-module transformation.
///
/// Implementations read `module` without mutating it and return a new
/// module. Scalar functions pass through unchanged unless the pass generates
/// them.
pub trait Pass {
    /// Short stable name used in logs and errors.
    fn name(&self) -> &'static str;

    fn run(&self, module: &Module) -> Result<Module, PassError>;
}

/// An ordered sequence of passes, run strictly one after another.
pub struct Pipeline {
    config: PipelineConfig,
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// An empty pipeline.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            passes: Vec::new(),
        }
    }

    /// FMA fusion, dataflow demotion, DPS rewrite, memory lowering and shape
    /// lowering, in that order.
    pub fn standard(config: PipelineConfig) -> Self {
        let memory = VmMemoryLower::new(config.storage_alignment, config.device);
        let shape = VmShapeLower::new(config.shape_func_name.clone());
        Self::new(config)
            .add(FmaRewrite)
            .add(ToNonDataflow)
            .add(CallDpsRewrite)
            .add(memory)
            .add(shape)
    }

    #[must_use]
    pub fn add(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.passes.iter().map(|p| p.name())
    }

    /// Run every pass on the output of the previous one.
    pub fn run(&self, module: &Module) -> Result<Module, PassError> {
        let mut current: Option<Module> = None;
        for pass in &self.passes {
            let span = tracing::debug_span!("pass", name = pass.name());
            let _enter = span.enter();

            let input = current.as_ref().unwrap_or(module);
            let output = pass.run(input)?;
            if self.config.verify_each {
                verify(pass.name(), &output)?;
            }
            tracing::debug!(items = output.len(), "pass finished");
            current = Some(output);
        }
        Ok(current.unwrap_or_else(|| module.clone()))
    }
}

fn verify(pass: &'static str, module: &Module) -> Result<(), PassError> {
    for func in module.functions() {
        well_formed::check(func).map_err(|source| PassError::Verify { pass, source })?;
    }
    Ok(())
}
