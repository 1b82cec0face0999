use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

use crate::{
    entities::order::PaymentMethod,
    errors::ServiceError,
    services::pricing::ShippingAddress,
    ApiResponse,
};

pub const DEFAULT_COUNTRY: &str = "India";
pub const MAX_PAGE_SIZE: u64 = 100;

/// Six digits, no leading zero.
pub static POSTAL_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9][0-9]{5}$").unwrap());
/// 10 to 15 characters of digits and `+`.
pub static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9+]{10,15}$").unwrap());

/// 200 with `data`.
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 200 with a message and `data`.
pub fn message_response<T: Serialize>(message: &str, data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::with_message(message, data))).into_response()
}

/// 201 with a message and `data`.
pub fn created_response<T: Serialize>(message: &str, data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::with_message(message, data))).into_response()
}

/// Runs the DTO's validation rules; failures become a 400 listing every bad field.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

pub fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

pub fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(validation_error("range", "Amount must be greater than zero"));
    }
    Ok(())
}

pub fn validate_non_negative_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(validation_error("range", "Price cannot be negative"));
    }
    Ok(())
}

/// `page`/`limit` query parameters shared by list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PageParams {
    /// One-based page and a limit clamped to `1..=MAX_PAGE_SIZE`.
    pub fn resolve(self, default_limit: u64) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ShippingAddressInput {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: String,
    #[validate(length(min = 5, max = 100, message = "Street address must be between 5 and 100 characters"))]
    pub street: String,
    #[validate(length(min = 2, max = 50, message = "City must be between 2 and 50 characters"))]
    pub city: String,
    #[validate(length(min = 2, max = 50, message = "State must be between 2 and 50 characters"))]
    pub state: String,
    #[validate(regex(path = "POSTAL_CODE", message = "Please provide a valid 6-digit postal code"))]
    pub postal_code: String,
    #[validate(regex(path = "PHONE", message = "Please provide a valid phone number"))]
    pub phone: String,
    #[validate(length(min = 2, max = 50, message = "Country must be between 2 and 50 characters"))]
    pub country: Option<String>,
}

impl From<ShippingAddressInput> for ShippingAddress {
    fn from(input: ShippingAddressInput) -> Self {
        Self {
            name: input.name.trim().to_string(),
            street: input.street.trim().to_string(),
            city: input.city.trim().to_string(),
            state: input.state.trim().to_string(),
            postal_code: input.postal_code,
            country: input
                .country
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            phone: input.phone,
        }
    }
}

/// Shipping and payment fields shared by cart checkout and buy-now bodies.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutDetails {
    #[validate]
    pub shipping_address: ShippingAddressInput,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddressInput {
        ShippingAddressInput {
            name: "Ravi Kumar".into(),
            street: "221 Park Street".into(),
            city: "Kolkata".into(),
            state: "West Bengal".into(),
            postal_code: "700016".into(),
            phone: "+919812345678".into(),
            country: None,
        }
    }

    #[test]
    fn postal_codes_are_six_digits_without_leading_zero() {
        assert!(POSTAL_CODE.is_match("560001"));
        assert!(!POSTAL_CODE.is_match("060001"));
        assert!(!POSTAL_CODE.is_match("56001"));
        assert!(!POSTAL_CODE.is_match("56000A"));
    }

    #[test]
    fn address_defaults_country() {
        assert!(address().validate().is_ok());
        let converted: ShippingAddress = address().into();
        assert_eq!(converted.country, DEFAULT_COUNTRY);
    }

    #[test]
    fn address_rejects_short_phone_and_bad_postal_code() {
        let mut input = address();
        input.phone = "12345".into();
        input.postal_code = "012345".into();
        let err: ServiceError = input.validate().unwrap_err().into();
        let fields: Vec<_> = err
            .field_errors()
            .unwrap()
            .iter()
            .map(|f| f.field.as_str())
            .collect();
        assert_eq!(fields, vec!["phone", "postal_code"]);
    }

    #[test]
    fn page_params_are_clamped() {
        assert_eq!(PageParams::default().resolve(10), (1, 10));
        let params = PageParams {
            page: Some(0),
            limit: Some(1000),
        };
        assert_eq!(params.resolve(10), (1, MAX_PAGE_SIZE));
    }

    #[test]
    fn amounts_must_be_positive() {
        assert!(validate_positive_amount(&Decimal::ONE).is_ok());
        assert!(validate_positive_amount(&Decimal::ZERO).is_err());
        assert!(validate_non_negative_amount(&Decimal::ZERO).is_ok());
        assert!(validate_non_negative_amount(&Decimal::NEGATIVE_ONE).is_err());
    }
}
