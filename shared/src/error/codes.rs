//! Unified error codes for the hub
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 4xxx: Order errors
//! - 6xxx: Menu errors
//! - 7xxx: Store errors
//! - 8xxx: Integration errors (aggregators, POS, notification channels)
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Store secret does not match the aggregator integration
    InvalidStoreSecret = 1002,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order already exists (duplicate aggregator delivery)
    OrderAlreadyExists = 4002,
    /// Aggregator payload could not be mapped to an order
    OrderPayloadInvalid = 4003,
    /// Status transition is not allowed
    OrderStatusInvalid = 4004,
    /// POS asked for the order to be resent later
    OrderRetryable = 4005,
    /// POS rejected the order
    OrderRejectedByPos = 4006,

    // ==================== 6xxx: Menu ====================
    /// Menu not found
    MenuNotFound = 6001,
    /// Product not found
    ProductNotFound = 6002,
    /// Attribute not found
    AttributeNotFound = 6003,

    // ==================== 7xxx: Store ====================
    /// Store not found
    StoreNotFound = 7001,
    /// Restaurant is not part of the virtual store
    VirtualRestaurantUnknown = 7002,
    /// Store has no integration for the aggregator
    AggregatorNotConfigured = 7003,

    // ==================== 8xxx: Integration ====================
    /// No adapter registered for the aggregator
    AggregatorUnsupported = 8001,
    /// Aggregator call failed
    AggregatorRequestFailed = 8002,
    /// No adapter registered for the POS type
    PosUnsupported = 8101,
    /// POS call failed
    PosRequestFailed = 8102,
    /// Notification could not be delivered
    NotificationFailed = 8201,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,

    // ==================== 94xx: Storage ====================
    /// Storage full (disk space insufficient)
    StorageFull = 9401,
    /// Storage corrupted (data file damaged)
    StorageCorrupted = 9403,
    /// System busy (IO error, retry later)
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",

            // Auth
            ErrorCode::NotAuthenticated => "Caller is not authenticated",
            ErrorCode::InvalidStoreSecret => "Store secret is invalid",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderAlreadyExists => "Order already exists",
            ErrorCode::OrderPayloadInvalid => "Order payload is invalid",
            ErrorCode::OrderStatusInvalid => "Order status transition is not allowed",
            ErrorCode::OrderRetryable => "Order submission should be retried",
            ErrorCode::OrderRejectedByPos => "Order was rejected by the POS",

            // Menu
            ErrorCode::MenuNotFound => "Menu not found",
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::AttributeNotFound => "Attribute not found",

            // Store
            ErrorCode::StoreNotFound => "Store not found",
            ErrorCode::VirtualRestaurantUnknown => "Restaurant is not part of the virtual store",
            ErrorCode::AggregatorNotConfigured => "Aggregator is not configured for the store",

            // Integration
            ErrorCode::AggregatorUnsupported => "Aggregator is not supported",
            ErrorCode::AggregatorRequestFailed => "Aggregator request failed",
            ErrorCode::PosUnsupported => "POS type is not supported",
            ErrorCode::PosRequestFailed => "POS request failed",
            ErrorCode::NotificationFailed => "Notification delivery failed",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",

            // Storage
            ErrorCode::StorageFull => "Storage full (disk space insufficient)",
            ErrorCode::StorageCorrupted => "Storage corrupted (data file damaged)",
            ErrorCode::SystemBusy => "System busy, please retry later",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidStoreSecret),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderAlreadyExists),
            4003 => Ok(ErrorCode::OrderPayloadInvalid),
            4004 => Ok(ErrorCode::OrderStatusInvalid),
            4005 => Ok(ErrorCode::OrderRetryable),
            4006 => Ok(ErrorCode::OrderRejectedByPos),

            // Menu
            6001 => Ok(ErrorCode::MenuNotFound),
            6002 => Ok(ErrorCode::ProductNotFound),
            6003 => Ok(ErrorCode::AttributeNotFound),

            // Store
            7001 => Ok(ErrorCode::StoreNotFound),
            7002 => Ok(ErrorCode::VirtualRestaurantUnknown),
            7003 => Ok(ErrorCode::AggregatorNotConfigured),

            // Integration
            8001 => Ok(ErrorCode::AggregatorUnsupported),
            8002 => Ok(ErrorCode::AggregatorRequestFailed),
            8101 => Ok(ErrorCode::PosUnsupported),
            8102 => Ok(ErrorCode::PosRequestFailed),
            8201 => Ok(ErrorCode::NotificationFailed),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            // Storage
            9401 => Ok(ErrorCode::StorageFull),
            9403 => Ok(ErrorCode::StorageCorrupted),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::InvalidStoreSecret.code(), 1002);
        assert_eq!(ErrorCode::OrderAlreadyExists.code(), 4002);
        assert_eq!(ErrorCode::MenuNotFound.code(), 6001);
        assert_eq!(ErrorCode::StoreNotFound.code(), 7001);
        assert_eq!(ErrorCode::PosRequestFailed.code(), 8102);
        assert_eq!(ErrorCode::SystemBusy.code(), 9404);
    }

    #[test]
    fn test_try_from_valid() {
        assert_eq!(ErrorCode::try_from(0), Ok(ErrorCode::Success));
        assert_eq!(ErrorCode::try_from(4005), Ok(ErrorCode::OrderRetryable));
        assert_eq!(ErrorCode::try_from(8001), Ok(ErrorCode::AggregatorUnsupported));
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(4999), Err(InvalidErrorCode(4999)));
        assert_eq!(ErrorCode::try_from(12345), Err(InvalidErrorCode(12345)));
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&ErrorCode::StoreNotFound).unwrap();
        assert_eq!(json, "7001");
    }

    #[test]
    fn test_deserialize() {
        let code: ErrorCode = serde_json::from_str("4006").unwrap();
        assert_eq!(code, ErrorCode::OrderRejectedByPos);
    }

    #[test]
    fn test_deserialize_invalid() {
        let result: Result<ErrorCode, _> = serde_json::from_str("4242");
        assert!(result.is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorCode::Success), "E0000");
        assert_eq!(format!("{}", ErrorCode::OrderNotFound), "E4001");
    }

    #[test]
    fn test_roundtrip() {
        let codes = [
            ErrorCode::Unknown,
            ErrorCode::NotAuthenticated,
            ErrorCode::OrderPayloadInvalid,
            ErrorCode::AttributeNotFound,
            ErrorCode::AggregatorNotConfigured,
            ErrorCode::NotificationFailed,
            ErrorCode::StorageCorrupted,
        ];
        for code in codes {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }
}
