pub mod engine;
pub mod ledger;
pub mod milestones;
pub mod models;
pub mod outbox;
pub mod store;
pub mod timeline;

pub use engine::{EnginePolicy, OrderEngine};
pub use models::{CreateOrder, Milestone, Order, OrderPatch, OrderStatus, Payment};
pub use outbox::{Outbox, OutboxDispatcher, SideEffect};
pub use store::{MemoryOrderStore, OrderStore};
