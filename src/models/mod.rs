//! Domain model module declarations.

pub mod refine;
pub mod rerun;
pub mod run;
pub mod session;
pub mod widget;
