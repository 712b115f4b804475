use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use escrow_trade_engine::{ConversationApiError, TradeFlowError};
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The request is not allowed in the current state. {0}")]
    InvalidState(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingCallerAddress => StatusCode::UNAUTHORIZED,
                AuthError::MissingSignature => StatusCode::UNAUTHORIZED,
                AuthError::InvalidSignature => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedHeader(_) => StatusCode::BAD_REQUEST,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::InvalidState(_) => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No caller address was provided.")]
    MissingCallerAddress,
    #[error("No caller signature was provided.")]
    MissingSignature,
    #[error("The caller signature is invalid.")]
    InvalidSignature,
    #[error("A caller header is not in the correct format. {0}")]
    PoorlyFormattedHeader(String),
}

impl From<TradeFlowError> for ServerError {
    fn from(e: TradeFlowError) -> Self {
        match e {
            TradeFlowError::ValidationError(s) => Self::InvalidRequestBody(s),
            TradeFlowError::Forbidden(s) => Self::InsufficientPermissions(s),
            TradeFlowError::InvalidState(s) => Self::InvalidState(s),
            TradeFlowError::NotFound(s) => Self::NoRecordFound(s),
            TradeFlowError::DatabaseError(s) => {
                error!("🗃️ Database error while handling a trade request. {s}");
                Self::BackendError(format!("Database error: {s}"))
            },
        }
    }
}

impl From<ConversationApiError> for ServerError {
    fn from(e: ConversationApiError) -> Self {
        match e {
            ConversationApiError::ValidationError(s) => Self::InvalidRequestBody(s),
            ConversationApiError::Forbidden(s) => Self::InsufficientPermissions(s),
            ConversationApiError::NotFound(s) => Self::NoRecordFound(s),
            ConversationApiError::DatabaseError(s) => {
                error!("🗃️ Database error while handling a conversation request. {s}");
                Self::BackendError(format!("Database error: {s}"))
            },
        }
    }
}
