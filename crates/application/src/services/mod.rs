mod message_service;
mod user_service;

pub use message_service::{
    MessageService, MessageServiceDependencies, SendMessageRequest, Sidebar,
};
pub use user_service::{
    LoginRequest, SignupRequest, UpdateProfileRequest, UserService, UserServiceDependencies,
};
