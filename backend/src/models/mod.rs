//! Data models shared across storage and API handlers.

pub mod client;
pub mod one_time_code;
pub mod pagination;
pub mod session;
pub mod user;

pub use client::Client;
pub use one_time_code::{CodePurpose, NewOneTimeCode, OneTimeCode};
pub use pagination::{PageMetadata, PageRequest, SortDirection};
pub use session::{NewSession, Session, SessionResponse};
pub use user::{
    NewUser, Profile, TokenResponse, User, UserListFilter, UserListResponse, UserResponse,
    UserSortField,
};
