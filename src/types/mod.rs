//! Wire types for the marketplace API.

mod advertisement;
mod auth;
mod category;
mod chat;

pub use advertisement::{
    AdSearchParams, Advertisement, CreateAdvertisementRequest, FavoriteAdvertisement, Page,
};
pub use auth::{LoginRequest, RatingStats, RegisterRequest, TokenResponse, User, UserResponse};
pub use category::{Category, CategoryList};
pub use chat::{ChatMessage, ChatSummary, OutgoingChatMessage, TypingStatus, destinations};
