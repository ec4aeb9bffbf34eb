// Domain models for the control-plane topology

mod container;
mod endpoint;
mod snapshot;
mod stack;
mod stats;

pub use container::{Container, ContainerKey, ContainerState, EndpointId};
pub use endpoint::{Endpoint, EndpointStatus};
pub use snapshot::{KeyTransition, PartialData, Snapshot, StackCounts};
pub use stack::{Stack, StackId, StackKey, StackProvenance};
pub use stats::{ContainerStatsState, SmoothedStats, StatsSample};
