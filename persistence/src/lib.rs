//! Records the simulation reads and writes, and the store they live in.

pub mod airport;
pub mod errors;
pub mod memory;
pub mod model;
pub mod retry;
pub mod store;

pub use airport::Airport;
pub use errors::StoreError;
pub use memory::MemoryStore;
pub use model::{
    Aircraft, AircraftId, AircraftStatus, CabinPrices, CheckIntervals, CheckLog, HeavyCheck,
    LeaseOut, Listing, ListingKind, Membership, MembershipId, RecallInfo, Route, RouteId,
    RouteStats, World, WorldId, WorldStatus,
};
pub use retry::RetryPolicy;
pub use store::Store;
