//! Incremental Schedules Direct sync for sdsync.
//!
//! Provides the phase-by-phase sync pipeline and the XMLTV exporter.

/// Station selection.
pub mod filter;
/// Sync pipeline.
pub mod pipeline;
/// XMLTV writer.
pub mod xmltv;

pub use filter::ChannelFilter;
pub use pipeline::{
    LineupPhase, Phase, ProgramCursor, SchedulePhase, SyncOutput, SyncPipeline, group_by_station,
};
pub use xmltv::{XmltvOptions, XmltvSummary, write_xmltv};
