//! Ingestion: exports in, working batch out
//!
//! - [`export`] - CSV reading and atomic writing
//! - [`merge`] - folds the new export into the carry-over
//! - [`dedup`] - drops records the store already knows
//! - [`cod`] - joins the cause-of-death results

pub mod cod;
pub mod dedup;
pub mod export;
pub mod merge;

pub use cod::{apply_cod_results, read_cod_results, CodReport, CodResult};
pub use dedup::{filter_duplicates, DedupReport};
pub use merge::{append_to_carry_over, merge_exports, MergeOutcome, MergeReport};
