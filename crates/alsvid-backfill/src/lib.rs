//! Alsvid backfill engine
//!
//! Given a priority-ordered queue of idle jobs and a cluster whose
//! higher-priority work is already reserved, decide which lower-priority
//! jobs can start immediately in the gaps, without delaying any existing
//! reservation.
//!
//! The engine is window discovery ([`locate_window`]) plus four filling
//! strategies sharing the same queue/node-table abstraction:
//!
//! - [`preemptive_fill`] — highest backfill-priority preemptor wins each
//!   round
//! - [`first_fit_fill`] — one forward pass, largest fitting shape per job,
//!   optional chunking
//! - [`best_fit_fill`] — repeated full-queue scans, best utility wins each
//!   round
//! - [`greedy_fill`] — bounded depth-first search over ordered queue
//!   subsets, with a best-fit fallback on commit failure
//!
//! [`run_pass`] ties one window discovery to one strategy; exactly one
//! strategy runs per scheduling pass. All four are synchronous and assume
//! exclusive access to the tables for the call's duration.
//!
//! # Example
//!
//! ```rust
//! use alsvid_backfill::{run_pass, BackfillStrategy, FirstFitScratch};
//! use alsvid_core::{
//!     BackfillQueue, Cluster, Job, MockResourceManager, Node, PartitionId, PolicyLevel,
//!     SchedConfig, SchedCtx,
//! };
//!
//! let mut cluster = Cluster::new(SchedConfig::default());
//! cluster.add_node(Node::new("n0", 8));
//! let job = cluster.add_job(Job::new("sim", 4, 3_600));
//!
//! let mut rm = MockResourceManager::new();
//! let mut queue = BackfillQueue::from_ids([job]);
//! let mut scratch = FirstFitScratch::new();
//! let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);
//!
//! let stats = run_pass(
//!     &mut ctx,
//!     &mut queue,
//!     &mut scratch,
//!     BackfillStrategy::FirstFit,
//!     &Job::new("probe", 1, 600),
//!     0,
//! )
//! .unwrap();
//!
//! assert_eq!(stats.started, 1);
//! assert_eq!(stats.remaining_procs, 4);
//! ```

pub mod bestfit;
pub mod error;
pub mod firstfit;
pub mod greedy;
pub mod pass;
pub mod preempt;
pub mod snapshot;
pub mod window;

pub use bestfit::best_fit_fill;
pub use error::{BackfillError, BackfillResult};
pub use firstfit::{first_fit_fill, FirstFitScratch};
pub use greedy::{greedy_fill, MAX_GREEDY_JOBS};
pub use pass::{run_pass, BackfillStrategy, PassStats};
pub use preempt::preemptive_fill;
pub use snapshot::ClusterSnapshot;
pub use window::{locate_window, Window, WindowDuration, PROBE_JOB_NAME};
