mod base;
mod memory;
mod postgres;

pub use base::EventStore;
pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;
