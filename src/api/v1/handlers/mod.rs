pub mod csrf_cookie;
pub mod health;
pub mod me;
pub mod tokens;
