//! Alsvid cluster scheduling model
//!
//! This crate provides the shared data model that the Alsvid backfill engine
//! operates over: jobs with alternative shapes, the node table, partitions,
//! standing reservations, and the priority-ordered backfill queue.
//!
//! # Core Components
//!
//! - **Jobs**: [`Job`], [`JobId`], [`Shape`] — idle work with one or more
//!   alternative (task-count, walltime) shapes
//! - **Nodes**: [`Node`], [`NodeIndex`], [`NodeState`] — cluster resources
//!   with per-node reservation lists
//! - **Partitions**: [`Partition`], [`PartitionId`] — accounting domains;
//!   index 0 is the global partition carrying cluster-wide defaults
//! - **Cluster**: [`Cluster`] — the node/job/partition tables plus the
//!   scheduler clock and configuration
//! - **Queue**: [`BackfillQueue`] — priority-ordered slots that a filling
//!   strategy can mark ineligible without touching the underlying jobs
//! - **Resource manager**: [`ResourceManager`] — the narrow interface through
//!   which the engine checks policy limits, selects and allocates nodes, and
//!   starts jobs
//! - **Context**: [`SchedCtx`] — the explicit shared context handed to every
//!   filling strategy

pub mod cluster;
pub mod config;
pub mod ctx;
pub mod error;
pub mod job;
pub mod node;
pub mod partition;
pub mod queue;
pub mod rm;

pub use cluster::{Cluster, RsvKind, StandingReservation};
pub use config::{NodeSetPolicy, SchedConfig, WindowSearch, MAX_TIME};
pub use ctx::SchedCtx;
pub use error::{CoreError, CoreResult};
pub use job::{Job, JobFlags, JobId, JobState, SavedRequest, Shape};
pub use node::{Node, NodeIndex, NodeRejection, NodeReservation, NodeState};
pub use partition::{Partition, PartitionId, UtilityMetric};
pub use queue::{BackfillQueue, QueueSlot};
pub use rm::{MockResourceManager, NodeList, PolicyLevel, ResourceManager, Selection};
