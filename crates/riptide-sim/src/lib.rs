//! Link-impairment harness for integration testing.
//!
//! Joins two in-memory transport engines with a seeded lossy, duplicating,
//! reordering channel — no sockets, no namespaces. Impairment decisions are
//! deterministic per seed so a failing scenario replays exactly; timing
//! still rides the engines' real clocks.

pub mod link;

/// Install a compact tracing subscriber honoring `RUST_LOG`. Safe to call
/// from every test; only the first call wins.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .try_init();
}
