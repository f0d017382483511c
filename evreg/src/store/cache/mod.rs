mod base;
mod memory;
mod redis;

pub use base::SlotCache;
pub use memory::MemorySlotCache;
pub use redis::RedisSlotCache;
