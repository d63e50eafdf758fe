//! Authentication request/response DTOs

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{CaptainResponse, PartyRole, RiderResponse, VehicleType};

/// Request to register a rider account
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRiderRequest {
    #[validate(length(min = 3, max = 50, message = "First name must be at least 3 characters"))]
    pub first_name: String,
    #[validate(length(min = 3, max = 50, message = "Last name must be at least 3 characters"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate(custom = "validate_password_strength")]
    pub password: String,
}

/// Vehicle details supplied at captain registration
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_vehicle_year"))]
pub struct VehicleRequest {
    pub vehicle_type: VehicleType,
    #[validate(length(min = 2, max = 50))]
    pub model: String,
    #[validate(length(min = 3, max = 20))]
    pub plate: String,
    #[validate(length(min = 3, max = 30, message = "Color must be at least 3 characters"))]
    pub color: String,
    #[validate(range(min = 1, max = 20, message = "Capacity must be at least 1"))]
    pub capacity: i32,
    #[validate(range(min = 1900, message = "Year must be 1900 or later"))]
    pub year: i32,
}

/// Request to register a captain account
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterCaptainRequest {
    #[validate(length(min = 3, max = 50, message = "First name must be at least 3 characters"))]
    pub first_name: String,
    #[validate(length(min = 3, max = 50, message = "Last name must be at least 3 characters"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate(custom = "validate_password_strength")]
    pub password: String,
    #[validate]
    pub vehicle: VehicleRequest,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Issued bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub party_id: Uuid,
    pub role: PartyRole,
}

/// Profile of whoever holds the token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ProfileResponse {
    Rider(RiderResponse),
    Captain(CaptainResponse),
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Password must be 8+ chars with upper, lower and a digit.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let long_enough = password.chars().count() >= 8;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        let mut err = ValidationError::new("weak_password");
        err.message = Some(
            "Password must be at least 8 characters and contain upper, lower case letters and a digit"
                .into(),
        );
        Err(err)
    }
}

fn validate_vehicle_year(vehicle: &VehicleRequest) -> Result<(), ValidationError> {
    use chrono::Datelike;

    if vehicle.year <= Utc::now().year() {
        Ok(())
    } else {
        Err(ValidationError::new("vehicle_year_out_of_range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Secret123").is_ok());
        assert!(validate_password_strength("secret123").is_err());
        assert!(validate_password_strength("SECRET123").is_err());
        assert!(validate_password_strength("SecretPass").is_err());
        assert!(validate_password_strength("Se1").is_err());
    }

    #[test]
    fn test_register_rider_validation() {
        let request = RegisterRiderRequest {
            first_name: "Al".to_string(),
            last_name: "Smith".to_string(),
            email: "not-an-email".to_string(),
            phone: None,
            password: "Secret123".to_string(),
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("email"));
        assert!(!fields.contains_key("password"));
    }

    #[test]
    fn test_vehicle_validation() {
        let vehicle = VehicleRequest {
            vehicle_type: VehicleType::Standard,
            model: "Swift".to_string(),
            plate: "KA01AB1234".to_string(),
            color: "White".to_string(),
            capacity: 0,
            year: 1850,
        };
        let errors = vehicle.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("capacity"));
        assert!(fields.contains_key("year"));

        let future = VehicleRequest {
            capacity: 4,
            year: 3000,
            ..vehicle
        };
        assert!(future.validate().is_err());
    }
}
