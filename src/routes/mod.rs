mod forward;
mod health_check;
mod login;

pub use forward::forward;
pub use health_check::health_check;
pub use login::{login, logout, refresh_token, save, LoginRequest, LogoutRequest, RefreshTokenRequest};
