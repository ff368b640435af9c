#[cfg(feature = "rerun")]
pub mod rerun_viz;
