pub mod connection;
pub mod migrations;
pub mod sessions;

pub use connection::{connect, connect_with_settings, DbPool};
pub use sessions::{
    open_session_store, spawn_sweeper, InMemorySessionStore, RedisSessionStore, SessionStore,
    SqlSessionStore, StoreError,
};
