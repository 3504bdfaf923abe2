pub mod connection;
pub mod dispatcher;
pub mod identity;
pub mod presence;
pub mod rooms;
pub mod session;
pub mod store;
