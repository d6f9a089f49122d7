//! Loop-invariant code motion over a small CFG/SSA IR.
//!
//! The crate builds functions as arenas of basic blocks in SSA form,
//! analyses their control flow, dominance, and loop structure, and runs a
//! short optimization pipeline whose centerpiece relocates loop-invariant
//! instructions into loop preheaders. A reference interpreter makes the
//! transformations testable by differential execution.

pub mod analysis;
pub mod interp;
pub mod ir;
pub mod opt;
