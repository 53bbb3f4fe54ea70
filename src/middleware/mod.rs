/*
 * Responsibility
 * - middleware public interface (re-export)
 * - the HTTP flavour of pipeline stages shared by csrf / cookies / stateful
 */
use std::future::Future;
use std::pin::Pin;

use axum::{body::Body, http::Request, response::Response};

use crate::error::AppError;
use crate::pipeline::{Continuation, Interceptor, Stage};

pub mod auth;
pub mod cookies;
pub mod cors;
pub mod csrf;
pub mod http;
pub mod input;
pub mod patterns;
pub mod security_headers;
pub mod stateful;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What an HTTP stage (and the rest of the chain) eventually yields.
pub type ResponseFuture = BoxFuture<'static, Result<Response, AppError>>;

pub type HttpNext = Continuation<Request<Body>, ResponseFuture>;
pub type HttpInterceptor = Interceptor<Request<Body>, ResponseFuture>;
pub type HttpStage = Stage<Request<Body>, ResponseFuture>;
