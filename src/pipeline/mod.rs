//! # Pipeline Module
//!
//! Separa le responsabilità della pipeline in sottomoduli:
//! - `media_pipeline`: Orchestratore (macchina a stati walk → classify → act → record)
//! - `task_processor`: Azione terminale per singolo file
//! - `progress_tracker`: Canale eventi verso l'osservatore
//! - `path_resolver`: Calcolo dei path di output
//! - `control`: Flag di esecuzione e controller del worker

pub mod control;
pub mod media_pipeline;
pub mod path_resolver;
pub mod progress_tracker;
pub mod task_processor;

#[cfg(test)]
pub(crate) mod testing;

pub use control::{PipelineController, RunControl, StartRequest};
pub use media_pipeline::{FileProcessingPipeline, PipelineState, RunOutcome, RunReport};
pub use path_resolver::PathResolver;
pub use progress_tracker::{ProgressEvent, ProgressTracker};
pub use task_processor::{TaskProcessor, TaskResult};
