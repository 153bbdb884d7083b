pub mod app_config;
pub mod database;
pub mod trip_repo;
pub mod booking_repo;
pub mod vehicle_repo;
pub mod account_repo;
pub mod catalog_repo;
pub mod memory;
pub mod redis_repo;
pub mod events;

pub use database::DbClient;
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;
pub use events::{EventProducer, KafkaNotifier};
