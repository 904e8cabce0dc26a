//! Admission control: per-client ban, daily and short-window limits.

mod clock;
mod gate;
mod keys;
mod memory;
mod policy;
mod redis_store;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{AdmissionGate, Decision, Rejection};
pub use keys::ClientKeys;
pub use memory::{MemoryStore, StoreOp};
pub use policy::{next_utc_midnight, AdmissionPolicy};
pub use redis_store::RedisStore;
pub use store::{CounterStore, CounterUpdate, Expiry, StoreError, StoreResult};
