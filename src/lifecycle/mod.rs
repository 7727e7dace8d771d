pub mod connection_state;
pub mod coordinator;
pub mod lifecycle_events;
pub mod lifecycle_manager;
pub mod shutdown;
