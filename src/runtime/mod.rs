//! Runtime adapters used to run background work.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
