pub mod messages;
pub mod presence;
pub mod rooms;
pub mod sessions;
pub mod users;
pub mod websocket;
