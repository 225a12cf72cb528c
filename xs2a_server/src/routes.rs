//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate function. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Core banking calls in particular can be slow, so they are always
//! awaited, never blocked on.
//!
//! Every route except `/health` lives in the `/v1` scope, behind the QWAC middleware. Handlers receive the calling
//! TPP through the [`TppCaller`] extractor.
use actix_web::{get, http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use log::*;
use xs2a_common::helpers::parse_boolean_flag;
use xs2a_engine::{
    db_types::{Authorisation, AuthorisationId, AuthorisationType, PsuIdData},
    traits::{AuthorisationManagement, CoreBankingSpi},
    AuthorisationApi,
    AuthorisationRequest,
    PsuDataUpdate,
    ScaError,
    ScaFlowApi,
};

use crate::{
    data_objects::{
        AuthorisationListResponse,
        AuthorisationResponse,
        ScaStatusResponse,
        StartAuthorisationRequest,
        UpdatePsuDataRequest,
    },
    errors::{sca_status_code, ServerError},
    middleware::TppCaller,
};

pub const PSU_ID_HEADER: &str = "PSU-ID";
pub const PSU_ID_TYPE_HEADER: &str = "PSU-ID-Type";
pub const PSU_CORPORATE_ID_HEADER: &str = "PSU-Corporate-ID";
pub const PSU_CORPORATE_ID_TYPE_HEADER: &str = "PSU-Corporate-ID-Type";
pub const EXPLICIT_PREFERRED_HEADER: &str = "TPP-Explicit-Authorisation-Preferred";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Authorisations  ----------------------------------------------
route!(start_authorisation => Post "/{service}/{resource_id}/authorisations" impl AuthorisationManagement);
/// Starts an authorisation for a consent, payment, payment cancellation or signing basket.
///
/// The PSU may be named up front in the `PSU-ID` header. A TPP that wants to collect several authorisations into a
/// signing basket sends `TPP-Explicit-Authorisation-Preferred: true`; whether it gets an explicit authorisation depends
/// on the bank supporting baskets.
pub async fn start_authorisation<B: AuthorisationManagement>(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    caller: TppCaller,
    body: web::Bytes,
    api: web::Data<AuthorisationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (service, resource_id) = path.into_inner();
    let authorisation_type = service_type(&service)?;
    debug!("💻️ POST {authorisation_type} authorisation from TPP {}", caller.0.authorisation_number);
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        StartAuthorisationRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?
    };
    let explicit_preferred =
        parse_boolean_flag(header_value(&req, EXPLICIT_PREFERRED_HEADER).map(String::from), false);
    let mut request = AuthorisationRequest::new(authorisation_type, resource_id.as_str())
        .with_explicit_preferred(explicit_preferred)
        .with_periodic_payment(body.periodic_payment);
    if let Some(psu) = psu_from_headers(&req) {
        request = request.with_psu(psu);
    }
    let result = api.create_authorisation(&caller.0, request).await?;
    let base = authorisation_path(&service, &resource_id, &result.authorisation_id);
    Ok(HttpResponse::Created().json(AuthorisationResponse::from_result(result, &base)))
}

route!(list_authorisations => Get "/{service}/{resource_id}/authorisations" impl AuthorisationManagement);
pub async fn list_authorisations<B: AuthorisationManagement>(
    path: web::Path<(String, String)>,
    caller: TppCaller,
    api: web::Data<AuthorisationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (service, resource_id) = path.into_inner();
    let authorisation_type = service_type(&service)?;
    check_role(&caller, authorisation_type)?;
    let authorisation_ids = api.authorisation_ids_for_resource(&resource_id).await?;
    Ok(HttpResponse::Ok().json(AuthorisationListResponse { authorisation_ids }))
}

route!(update_psu_data => Put "/{service}/{resource_id}/authorisations/{authorisation_id}" impl AuthorisationManagement, CoreBankingSpi);
/// Applies one step of PSU data to an authorisation.
///
/// The body carries at most one of `psuData.password`, `authenticationMethodId` or `scaAuthenticationData`. A request
/// without any of them identifies the PSU named in the `PSU-ID` header.
///
/// An update that ends the authorisation in failure still returns the authorisation (with status `failed`), using
/// the HTTP status of the failure.
pub async fn update_psu_data<B, S>(
    req: HttpRequest,
    path: web::Path<(String, String, String)>,
    caller: TppCaller,
    body: web::Bytes,
    authorisations: web::Data<AuthorisationApi<B>>,
    flow: web::Data<ScaFlowApi<B, S>>,
) -> Result<HttpResponse, ServerError>
where
    B: AuthorisationManagement,
    S: CoreBankingSpi,
{
    let (service, resource_id, id) = path.into_inner();
    let id = AuthorisationId::from(id);
    authorisation_in_path(authorisations.as_ref(), &service, &resource_id, &id).await?;
    let update = psu_data_update(&req, UpdatePsuDataRequest::try_from(body.as_ref())?)?;
    debug!("💻️ PUT {} for authorisation {id} from TPP {}", update.kind(), caller.0.authorisation_number);
    let result = flow.advance_authorisation(&id, &caller.0, update).await?;
    let status = result.error.as_ref().map(sca_status_code).unwrap_or(StatusCode::OK);
    let base = authorisation_path(&service, &resource_id, &id);
    Ok(HttpResponse::build(status).json(AuthorisationResponse::from_result(result, &base)))
}

route!(sca_status => Get "/{service}/{resource_id}/authorisations/{authorisation_id}" impl AuthorisationManagement);
pub async fn sca_status<B: AuthorisationManagement>(
    path: web::Path<(String, String, String)>,
    caller: TppCaller,
    api: web::Data<AuthorisationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (service, resource_id, id) = path.into_inner();
    let id = AuthorisationId::from(id);
    let authorisation = authorisation_in_path(api.as_ref(), &service, &resource_id, &id).await?;
    check_role(&caller, authorisation.authorisation_type)?;
    Ok(HttpResponse::Ok().json(ScaStatusResponse { sca_status: authorisation.sca_status }))
}

//----------------------------------------------   Helpers  ----------------------------------------------------

fn service_type(service: &str) -> Result<AuthorisationType, ServerError> {
    AuthorisationType::from_service_path(service).ok_or_else(|| ServerError::UnknownService(service.to_string()))
}

fn check_role(caller: &TppCaller, authorisation_type: AuthorisationType) -> Result<(), ServerError> {
    if authorisation_type.is_permitted_for(&caller.0.roles) {
        Ok(())
    } else {
        Err(ScaError::RoleNotPermitted { authorisation_type, roles: caller.0.roles_string() }.into())
    }
}

/// Fetches the authorisation, making sure it belongs to the resource and service named in the path.
async fn authorisation_in_path<B: AuthorisationManagement>(
    api: &AuthorisationApi<B>,
    service: &str,
    resource_id: &str,
    id: &AuthorisationId,
) -> Result<Authorisation, ServerError> {
    let authorisation_type = service_type(service)?;
    let authorisation = api.authorisation_for_resource(resource_id, id).await?;
    if authorisation.authorisation_type != authorisation_type {
        debug!("💻️ Authorisation {id} is {}, not {authorisation_type}", authorisation.authorisation_type);
        return Err(ScaError::AuthorisationNotFound(id.clone()).into());
    }
    Ok(authorisation)
}

fn authorisation_path(service: &str, resource_id: &str, id: &AuthorisationId) -> String {
    format!("/v1/{service}/{resource_id}/authorisations/{id}")
}

fn header_value<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|s| !s.is_empty())
}

pub fn psu_from_headers(req: &HttpRequest) -> Option<PsuIdData> {
    let psu_id = header_value(req, PSU_ID_HEADER)?;
    let mut psu = PsuIdData::new(psu_id);
    psu.psu_id_type = header_value(req, PSU_ID_TYPE_HEADER).map(String::from);
    psu.psu_corporate_id = header_value(req, PSU_CORPORATE_ID_HEADER).map(String::from);
    psu.psu_corporate_id_type = header_value(req, PSU_CORPORATE_ID_TYPE_HEADER).map(String::from);
    Some(psu)
}

/// Works out which kind of update the request carries. More than one kind in one request is a format error.
pub fn psu_data_update(req: &HttpRequest, body: UpdatePsuDataRequest) -> Result<PsuDataUpdate, ServerError> {
    let psu = psu_from_headers(req);
    let update = match (body.psu_data, body.authentication_method_id, body.sca_authentication_data) {
        (Some(data), None, None) => PsuDataUpdate::Password { psu, password: data.password },
        (None, Some(method_id), None) => PsuDataUpdate::ScaMethodSelection(method_id),
        (None, None, Some(code)) => PsuDataUpdate::AuthenticationCode(code),
        (None, None, None) => match psu {
            Some(psu) => PsuDataUpdate::PsuIdentification(psu),
            None => return Err(ScaError::FormatError("PSU-ID missing".into()).into()),
        },
        _ => {
            return Err(ScaError::FormatError(
                "Only one of psuData, authenticationMethodId and scaAuthenticationData may be sent".into(),
            )
            .into())
        },
    };
    Ok(update)
}
