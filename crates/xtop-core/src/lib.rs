//! xtop-core — the diagnosis pipeline shared by the xtop daemon and its
//! presentation layers.
//!
//! Provides:
//! - `model` — snapshot/rate data model
//! - `evidence` — typed evidence, normalization, slot weights
//! - `rates` — counter-delta rate calculator
//! - `history` — bounded ring history with copy-out semantics
//! - `scorers` — per-domain trust-gated scoring
//! - `correlation` — pattern/narrative/DAG/temporal correlation
//! - `anomaly` — onset stamping, top changes, exhaustion, degradation
//! - `alert` — sustained-threshold alert state machine
//! - `events` — incident event detector and log
//! - `probe` — on-demand probe manager and always-on sentinel
//! - `orchestrator` — tick sequencing
//! - `diskguard` — mount growth EWMA and lifecycle state
//! - `recorder` — frame capture and deterministic replay
//! - `collector` — collector registry trait boundary
//! - `analysis` — the `AnalysisResult` envelope and analyze() entry point
//! - `config` — configuration, threshold profiles, daemon state paths
//! - `errors` — soft/hard error kinds

pub mod alert;
pub mod analysis;
pub mod anomaly;
pub mod collector;
pub mod config;
pub mod correlation;
pub mod diskguard;
pub mod errors;
pub mod events;
pub mod evidence;
pub mod history;
pub mod model;
pub mod orchestrator;
pub mod probe;
pub mod rates;
pub mod recorder;
pub mod scorers;
