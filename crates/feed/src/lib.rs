pub mod memory;
pub mod yahoo;

pub use memory::MemoryFeed;
pub use yahoo::YahooClient;
