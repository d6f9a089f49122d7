//! Optimization passes and the pipeline that drives them.

use thiserror::Error;

use crate::ir::model::Function;

pub mod licm;
pub mod promote;
pub mod simplify;

/// What a pass did to the analyses computed before it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    /// The pass changed nothing; prior analyses remain valid.
    Preserved,
    /// Cached dominance, loop, and liveness information must be recomputed.
    Invalidated,
}

/// An optimization pass over a single function.
pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&mut self, func: &mut Function) -> PassResult;
}

/// Looks up a pass by the name it is registered under.
pub fn create_pass(name: &str) -> Option<Box<dyn Pass>> {
    match name {
        "promote-locals" => Some(Box::new(promote::PromoteLocals)),
        "loop-simplify" => Some(Box::new(simplify::LoopSimplify)),
        "licm" => Some(Box::new(licm::Licm)),
        _ => None,
    }
}

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("unknown pass `{0}` in pipeline description")]
    UnknownPass(String),
}

/// Runs a sequence of passes, once each, over a set of functions.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl std::fmt::Debug for PassManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassManager")
            .field(
                "passes",
                &self.passes.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PassManager {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The standard pipeline: scalar locals are promoted first, and the
    /// motion pass sits at a fixed point directly after that early stage,
    /// where invariance reasoning sees values instead of memory traffic.
    pub fn standard() -> Self {
        Self {
            passes: vec![
                Box::new(promote::PromoteLocals),
                Box::new(licm::Licm),
            ],
        }
    }

    /// Builds a pipeline from a comma-separated description, e.g.
    /// `"promote-locals,licm"`.
    pub fn parse(desc: &str) -> Result<Self, PipelineError> {
        let mut manager = Self::new();
        for name in desc.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let pass =
                create_pass(name).ok_or_else(|| PipelineError::UnknownPass(name.to_string()))?;
            manager.passes.push(pass);
        }
        Ok(manager)
    }

    pub fn add(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn run(&mut self, funcs: &mut [Function]) {
        for pass in &mut self.passes {
            for func in funcs.iter_mut() {
                let result = pass.run(func);
                log::debug!(
                    "{}: {} ({})",
                    pass.name(),
                    func.name,
                    match result {
                        PassResult::Preserved => "analyses preserved",
                        PassResult::Invalidated => "analyses invalidated",
                    }
                );
            }
        }
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "../tests/opt/mod.rs"]
mod tests;
