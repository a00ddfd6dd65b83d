// Authentication module
// Opaque bearer tokens, one per user, with registration, login and profile management

pub mod error;
pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod token;
pub mod validator;

// Re-export commonly used types
pub use error::AuthError;
#[cfg(test)]
pub use memory::InMemoryRepository;
pub use middleware::AuthenticatedUser;
pub use models::{AuthResponse, LoginRequest, RegisterRequest, User, UserResponse};
pub use password::{HashingConfig, PasswordPolicy, PasswordService};
pub use repository::{PgTokenRepository, PgUserRepository, TokenRepository, UserRepository};
pub use service::AuthService;
