use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use thiserror::Error;
use xs2a_engine::{
    certificate::CertificateError,
    traits::{SpiFailure, SpiFailureKind},
    ScaError,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("No TPP certificate was provided")]
    CertificateMissing,
    #[error("The TPP certificate is invalid. {0}")]
    CertificateInvalid(#[from] CertificateError),
    #[error("{0}")]
    Sca(#[from] ScaError),
    #[error("Unknown service: {0}")]
    UnknownService(String),
}

impl ServerError {
    /// The error code reported to the TPP next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InitializeError(_) | Self::ConfigurationError(_) | Self::IOError(_) | Self::Unspecified(_) => {
                "INTERNAL_SERVER_ERROR"
            },
            Self::InvalidRequestBody(_) => "FORMAT_ERROR",
            Self::CertificateMissing => "CERTIFICATE_MISSING",
            Self::CertificateInvalid(e) => certificate_code(e),
            Self::Sca(e) => sca_code(e),
            Self::UnknownService(_) => "SERVICE_INVALID",
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::CertificateMissing => StatusCode::UNAUTHORIZED,
            Self::CertificateInvalid(_) => StatusCode::UNAUTHORIZED,
            Self::Sca(e) => sca_status_code(e),
            Self::UnknownService(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ {self}");
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string(), "code": self.code() }).to_string())
    }
}

/// The HTTP status an SCA error is reported with, whether it rejected a request or failed an authorisation.
pub fn sca_status_code(e: &ScaError) -> StatusCode {
    match e {
        ScaError::CertificateInvalid(_) => StatusCode::UNAUTHORIZED,
        ScaError::CryptoProviderUnknown(_) => StatusCode::NOT_FOUND,
        ScaError::DecryptionFailed(_) => StatusCode::NOT_FOUND,
        ScaError::InvalidResourceId(_) => StatusCode::NOT_FOUND,
        ScaError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ScaError::PsuCredentialsInvalid(_) => StatusCode::UNAUTHORIZED,
        ScaError::ScaMethodUnknown(_) => StatusCode::BAD_REQUEST,
        ScaError::WrongAuthorisationStage { .. } => StatusCode::CONFLICT,
        ScaError::RoleNotPermitted { .. } => StatusCode::FORBIDDEN,
        ScaError::CoreBankingFailure(f) => spi_status_code(f),
        ScaError::FormatError(_) => StatusCode::BAD_REQUEST,
        ScaError::AuthorisationNotFound(_) => StatusCode::NOT_FOUND,
        ScaError::AuthorisationBusy(_) => StatusCode::CONFLICT,
        ScaError::AuthorisationExpired(_) => StatusCode::FORBIDDEN,
        ScaError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn spi_status_code(failure: &SpiFailure) -> StatusCode {
    match failure.kind {
        SpiFailureKind::Unauthorized => StatusCode::UNAUTHORIZED,
        SpiFailureKind::LogicalFailure => StatusCode::BAD_REQUEST,
        SpiFailureKind::NotSupported => StatusCode::NOT_IMPLEMENTED,
        SpiFailureKind::TechnicalFailure => StatusCode::BAD_GATEWAY,
    }
}

pub fn sca_code(e: &ScaError) -> &'static str {
    match e {
        ScaError::CertificateInvalid(c) => certificate_code(c),
        ScaError::CryptoProviderUnknown(_) | ScaError::DecryptionFailed(_) | ScaError::InvalidResourceId(_) => {
            "RESOURCE_UNKNOWN"
        },
        ScaError::Crypto(_) | ScaError::DatabaseError(_) => "INTERNAL_SERVER_ERROR",
        ScaError::PsuCredentialsInvalid(_) => "PSU_CREDENTIALS_INVALID",
        ScaError::ScaMethodUnknown(_) => "SCA_METHOD_UNKNOWN",
        ScaError::WrongAuthorisationStage { .. } => "STATUS_INVALID",
        ScaError::RoleNotPermitted { .. } => "ROLE_INVALID",
        ScaError::CoreBankingFailure(f) => match f.kind {
            SpiFailureKind::Unauthorized => "PSU_CREDENTIALS_INVALID",
            SpiFailureKind::LogicalFailure => "FORMAT_ERROR",
            SpiFailureKind::NotSupported => "SERVICE_BLOCKED",
            SpiFailureKind::TechnicalFailure => "INTERNAL_SERVER_ERROR",
        },
        ScaError::FormatError(_) => "FORMAT_ERROR",
        ScaError::AuthorisationNotFound(_) => "RESOURCE_UNKNOWN",
        ScaError::AuthorisationBusy(_) => "STATUS_INVALID",
        ScaError::AuthorisationExpired(_) => "RESOURCE_EXPIRED",
    }
}

fn certificate_code(e: &CertificateError) -> &'static str {
    match e {
        CertificateError::Expired => "CERTIFICATE_EXPIRED",
        CertificateError::Blocked(_) => "CERTIFICATE_BLOCKED",
        _ => "CERTIFICATE_INVALID",
    }
}
