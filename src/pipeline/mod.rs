pub mod controller;
pub mod events;
pub mod publisher;
pub mod runtime;
pub mod shutdown;
pub mod stats;
