//! Caller identity.
//!
//! Wallet authentication happens upstream, in the session gateway. The gateway forwards the authenticated address in
//! the `etg_caller_address` header and proves that it did so with `etg_caller_hmac`, which carries
//! `base64(HMAC-SHA256(ETG_CALLER_HMAC_SECRET, address))`.
//!
//! Handlers ask for a [`Caller`] argument to get the verified address. Requests without a valid identity never reach
//! the handler.
use std::ops::Deref;

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use escrow_trade_engine::db_types::Address;
use futures::future::{ready, Ready};
use log::*;

use crate::{
    config::CallerAuthConfig,
    errors::{AuthError, ServerError},
    helpers::verify_hmac,
};

pub const CALLER_ADDRESS_HEADER: &str = "etg_caller_address";
pub const CALLER_HMAC_HEADER: &str = "etg_caller_hmac";

/// The verified address of whoever made the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Address);

impl Caller {
    pub fn address(&self) -> &Address {
        &self.0
    }
}

impl Deref for Caller {
    type Target = Address;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for Caller {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(caller_from_request(req))
    }
}

fn caller_from_request(req: &HttpRequest) -> Result<Caller, ServerError> {
    let config = req.app_data::<web::Data<CallerAuthConfig>>().ok_or_else(|| {
        error!("🔐️ No caller authentication configuration was registered with the app. Denying access.");
        ServerError::ConfigurationError("Caller authentication is not configured".into())
    })?;
    let raw = header_value(req, CALLER_ADDRESS_HEADER)?.ok_or(AuthError::MissingCallerAddress)?;
    let address = Address::new(raw);
    if address.is_empty() {
        return Err(AuthError::MissingCallerAddress.into());
    }
    address.validate().map_err(|e| {
        warn!("🔐️ Refusing caller with an unusable address: {e}");
        AuthError::PoorlyFormattedHeader(format!("{CALLER_ADDRESS_HEADER}: {e}"))
    })?;
    if !config.hmac_checks {
        trace!("🔐️ Caller HMAC checks are disabled. Accepting {address}");
        return Ok(Caller(address));
    }
    let signature = header_value(req, CALLER_HMAC_HEADER)?.ok_or_else(|| {
        debug!("🔐️ No caller signature for {address}. Denying access.");
        AuthError::MissingSignature
    })?;
    // The gateway signs the address exactly as it forwards it
    if verify_hmac(config.hmac_secret.reveal(), raw.as_bytes(), signature) {
        trace!("🔐️ Caller signature for {address} ✅️");
        Ok(Caller(address))
    } else {
        warn!("🔐️ Invalid caller signature for {address}. Denying access.");
        Err(AuthError::InvalidSignature.into())
    }
}

fn header_value<'a>(req: &'a HttpRequest, name: &str) -> Result<Option<&'a str>, AuthError> {
    match req.headers().get(name) {
        None => Ok(None),
        Some(v) => v.to_str().map(Some).map_err(|e| AuthError::PoorlyFormattedHeader(format!("{name}: {e}"))),
    }
}
