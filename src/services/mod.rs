//! Service layer: the orchestration logic that composes the domain ports
//! and adapters into the seven core components (C3-C9). Nothing below
//! this module knows about HTTP, the CLI, or any other transport —
//! services are plain structs constructed with `Arc`-wrapped dependencies
//! and driven by whatever front-end a deployment chooses.

pub mod chat_core;
pub mod coordinator;
pub mod diversity;
pub mod executor;
pub mod registry;
pub mod research;
pub mod resource_monitor;

pub use chat_core::{ChatCore, ChatRequest};
pub use coordinator::{job, AgentCoordinator, Job, ScalingConfig};
pub use diversity::DiversityValidator;
pub use executor::ToolExecutor;
pub use registry::ToolRegistry;
pub use research::ResearchOrchestrator;
pub use resource_monitor::{ReserveOutcome, ResourceMonitor};
