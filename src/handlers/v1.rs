pub mod chats;
pub mod notifications;
