pub mod chat_service;
pub mod space_chat_service;
pub mod space_service;
