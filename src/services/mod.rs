pub mod auth;
pub mod encrypter;
