//! LuminaFly Dispatch - Failure simulation and repair dispatch engine
//!
//! This crate drives the drone fleet held in a
//! [`luminafly_store::EntityStore`]. It handles:
//! - Failure injection (random lamp burn-outs from a seedable RNG)
//! - Allocation of available drones to burned-out poles under repair locks
//! - Time-stepped flight animation with cooperative cancellation
//! - Mission lifecycle: outbound repair, retirement and recovery flights
//! - Event fan-out to connected observers
//! - The control loop scheduling all of the above
//!
//! # Concurrency
//!
//! The control loop runs ticks one after another. Every mission leg runs on
//! its own task owned by a [`tokio_util::task::TaskTracker`] and cancelled
//! through a [`tokio_util::sync::CancellationToken`] hierarchy:
//! - **Engine token**: cancelled by [`ControlLoop::stop`]
//! - **Mission token**: one child per outbound or recovery leg
//! - **Retirement token**: child of the outbound leg that spawned it
//!
//! At most one mission repairs a pole and a drone flies at most one mission
//! at a time; both are enforced by the [`ReservationTable`].
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use luminafly_core::Config;
//! use luminafly_dispatch::ControlLoop;
//! use luminafly_store::{seed, InMemoryEntityStore};
//!
//! # async fn run() {
//! let store = Arc::new(InMemoryEntityStore::new());
//! seed::seed_demo_fleet(store.as_ref(), &seed::DemoFleet::default()).unwrap();
//!
//! let engine = ControlLoop::new(store, &Config::default());
//! let (_id, mut feed) = engine.broadcaster().subscribe_channel(1000);
//! engine.start();
//! while let Some(frame) = feed.recv().await {
//!     println!("{}", frame);
//! }
//! # }
//! ```

#![warn(missing_docs)]

pub mod animator;
pub mod broadcaster;
pub mod context;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod injector;
pub mod lifecycle;
pub mod locks;
pub mod policy;
pub mod reservations;
pub mod retry;
pub mod rng;

pub use animator::{flight_path, FlightAnimator, FlightPath, Waypoint};
pub use broadcaster::{Delivery, EventBroadcaster, EventSink, Frame, SubscriptionId};
pub use context::FleetContext;
pub use control::{ControlLoop, EngineStatus};
pub use dispatcher::{DispatchOutcome, DispatchReport, Dispatcher};
pub use error::{DispatchError, DispatchResult, FlightError, MissionError};
pub use injector::FailureInjector;
pub use lifecycle::{MissionRunner, MissionScope, OutboundOrder, ReturnOrder};
pub use locks::{EntityGuard, EntityKey, EntityLocks};
pub use policy::{
    allocation_policy, return_base_policy, AllocationPolicy, FirstAvailable, FixedBase,
    NearestBase, NearestFirst, ReturnBasePolicy,
};
pub use reservations::{Acquisition, Lease, RepairAssignment, ReservationKey, ReservationTable};
pub use retry::{RecoveryItem, RetryQueue};
pub use rng::SimRng;
