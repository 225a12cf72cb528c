mod qwac;

pub use qwac::{QwacMiddlewareFactory, QwacMiddlewareService, TppCaller};
