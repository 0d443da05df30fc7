//! Classification of raw marketplace responses
//!
//! Each operation has its own closed outcome set. Classification matches on
//! `(status, Payload)` so every combination lands in exactly one arm, and the
//! trailing wildcard arm is the explicit "unexpected response" outcome.
//!
//! The marketplace signals success by status plus payload *shape*: a free
//! trial is started only by a 201 with an empty body, so a 201 carrying
//! `{"success": true}` is unexpected, not a success.

use common::Secret;
use serde_json::{Map, Value};

use crate::constants::LICENSE_KEY_FIELD;
use crate::transport::RawResponse;

/// Shape of a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Zero-length body
    Empty,
    /// A JSON object
    Object(Map<String, Value>),
    /// Valid JSON that is not an object (string, number, array, bool, null)
    OtherJson(Value),
    Unparseable,
}

impl Payload {
    pub fn parse(data: &str) -> Self {
        if data.is_empty() {
            return Payload::Empty;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(Value::Object(map)) => Payload::Object(map),
            Ok(other) => Payload::OtherJson(other),
            Err(_) => Payload::Unparseable,
        }
    }
}

/// Outcome of `createAccount`.
#[derive(Debug)]
pub enum CreateAccountOutcome {
    Created(Secret<String>),
    EmailRejectedInvalid,
    EmailRejectedDuplicate,
    UnexpectedResponse,
}

/// Outcome of validating a license key against `consumer/validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateTokenOutcome {
    Valid,
    TokenInvalid,
    UnexpectedResponse,
}

/// Outcome of starting a plugin free trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreeTrialOutcome {
    TrialStarted,
    /// Remote message, when the `error` field is a string
    TrialRejected(Option<String>),
    UnexpectedResponse,
}

pub fn create_account(response: &RawResponse) -> CreateAccountOutcome {
    match (response.status, Payload::parse(&response.data)) {
        (200, Payload::Object(body)) => match body.get(LICENSE_KEY_FIELD) {
            Some(Value::String(key)) if !key.is_empty() => {
                CreateAccountOutcome::Created(Secret::new(key.clone()))
            }
            _ => CreateAccountOutcome::UnexpectedResponse,
        },
        (200, _) => CreateAccountOutcome::UnexpectedResponse,
        (400, _) => CreateAccountOutcome::EmailRejectedInvalid,
        (409, _) => CreateAccountOutcome::EmailRejectedDuplicate,
        _ => CreateAccountOutcome::UnexpectedResponse,
    }
}

pub fn validate_token(response: &RawResponse) -> ValidateTokenOutcome {
    match (response.status, Payload::parse(&response.data)) {
        (200, Payload::Object(body)) => {
            let valid = matches!(body.get("isValid"), Some(Value::Bool(true)));
            let expired = matches!(body.get("isExpired"), Some(Value::Bool(true)));
            if valid && !expired {
                ValidateTokenOutcome::Valid
            } else {
                ValidateTokenOutcome::TokenInvalid
            }
        }
        (200, _) => ValidateTokenOutcome::UnexpectedResponse,
        (400 | 401 | 403 | 404, _) => ValidateTokenOutcome::TokenInvalid,
        _ => ValidateTokenOutcome::UnexpectedResponse,
    }
}

pub fn free_trial(response: &RawResponse) -> FreeTrialOutcome {
    match (response.status, Payload::parse(&response.data)) {
        (201, Payload::Empty) => FreeTrialOutcome::TrialStarted,
        (400, Payload::Object(body)) => match body.get("error") {
            Some(Value::String(message)) => FreeTrialOutcome::TrialRejected(Some(message.clone())),
            Some(_) => FreeTrialOutcome::TrialRejected(None),
            None => FreeTrialOutcome::UnexpectedResponse,
        },
        _ => FreeTrialOutcome::UnexpectedResponse,
    }
}
