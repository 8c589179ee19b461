//! Concrete `StorageAdapter` implementations. Plugins are expected to
//! contribute their own (Postgres, SQLite, PGLite); the in-memory one
//! here is what a runtime without a database-backed plugin falls back
//! to, and what integration tests build against.

pub mod memory;

pub use memory::InMemoryAdapter;
