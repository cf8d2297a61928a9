//! Core services - the relay's orchestration layer.
//!
//! Services here orchestrate between ports (trait interfaces) and domain
//! types. They never know which publisher or generation backend sits
//! behind the ports.

mod relay;
mod supervisor;

pub use relay::{ChunkFaultPolicy, RelayConfig, RelayPipeline};
pub use supervisor::{SessionHandle, SessionSupervisor, ShutdownReport, SupervisorError};
