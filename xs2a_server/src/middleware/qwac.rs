//! QWAC middleware for Actix Web.
//!
//! TLS is terminated in front of the gateway. The terminating proxy forwards the client certificate it received in a
//! request header (`TPP-Signature-Certificate` unless configured otherwise), as DER, PEM or single-line PEM.
//!
//! The middleware validates that certificate against the configured trust anchors and block list, reads the TPP's
//! identity and PSD2 roles from it, and stores the identity in the request extensions. Handlers get hold of it with
//! the [`TppCaller`] extractor. Requests without a valid certificate never reach the handlers.

use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    FromRequest,
    HttpMessage,
    HttpRequest,
};
use chrono::Utc;
use futures::future::LocalBoxFuture;
use log::{debug, trace, warn};
use xs2a_engine::certificate::{decode_certificate, extract_identity, CertificateValidator, TppIdentity};

use crate::{config::ServerOptions, errors::ServerError, helpers::get_remote_ip};

/// The identity of the TPP making the request, as established by the QWAC middleware.
#[derive(Debug, Clone)]
pub struct TppCaller(pub TppIdentity);

impl FromRequest for TppCaller {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let caller = req.extensions().get::<TppCaller>().cloned().ok_or_else(|| {
            warn!("📜️ A TPP route was reached without passing the QWAC middleware");
            ServerError::CertificateMissing
        });
        ready(caller)
    }
}

pub struct QwacMiddlewareFactory {
    validator: Arc<CertificateValidator>,
    options: ServerOptions,
}

impl QwacMiddlewareFactory {
    pub fn new(validator: Arc<CertificateValidator>, options: ServerOptions) -> Self {
        QwacMiddlewareFactory { validator, options }
    }
}

impl<S, B> Transform<S, ServiceRequest> for QwacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = QwacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(QwacMiddlewareService {
            validator: Arc::clone(&self.validator),
            options: self.options.clone(),
            service: Rc::new(service),
        }))
    }
}

pub struct QwacMiddlewareService<S> {
    validator: Arc<CertificateValidator>,
    options: ServerOptions,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for QwacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let validator = Arc::clone(&self.validator);
        let options = self.options.clone();
        Box::pin(async move {
            let remote_ip = get_remote_ip(req.request(), options.use_x_forwarded_for, options.use_forwarded);
            trace!("📜️ Checking TPP certificate for request from {remote_ip:?}");
            let identity = identify_caller(&req, &validator, &options.qwac_header).map_err(|e| {
                warn!("📜️ Rejecting request from {remote_ip:?} to {}. {e}", req.path());
                e
            })?;
            debug!(
                "📜️ Request from {remote_ip:?} authenticated as TPP {} [{}]",
                identity.authorisation_number,
                identity.roles_string()
            );
            req.extensions_mut().insert(TppCaller(identity));
            service.call(req).await
        })
    }
}

fn identify_caller(
    req: &ServiceRequest,
    validator: &CertificateValidator,
    header: &str,
) -> Result<TppIdentity, ServerError> {
    let value = req.headers().get(header).ok_or(ServerError::CertificateMissing)?;
    let der = decode_certificate(value.as_bytes())?;
    validator.validate(&der, Utc::now())?;
    let identity = extract_identity(&der)?;
    Ok(identity)
}
