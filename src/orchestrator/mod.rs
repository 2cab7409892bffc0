//! Session orchestration modules.
//!
//! Covers intent decoding, rerun target resolution, and the engine loop
//! that folds surface intents and run events into the session store.

pub mod engine;
pub mod intent;
pub mod rerun;
