//! Shared constants and invariants

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RENEWAL_PATH: &str = "/auth/token/refresh/";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_SESSION_FILE: &str = ".propertree/session.json";

// Persisted session slots
pub const SLOT_ACCESS_TOKEN: &str = "accessToken";
pub const SLOT_REFRESH_TOKEN: &str = "refreshToken";
pub const SLOT_USER: &str = "user";

// Auth endpoints
pub const PATH_LOGIN: &str = "/auth/login/";
pub const PATH_REGISTER: &str = "/auth/register/";
pub const PATH_PASSWORD_RESET: &str = "/auth/password-reset/";
pub const PATH_PASSWORD_RESET_CONFIRM: &str = "/auth/password-reset/confirm/";
pub const PATH_CHANGE_PASSWORD: &str = "/auth/change-password/";
pub const PATH_PROFILE: &str = "/users/profile/";
