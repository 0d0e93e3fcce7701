//! RPC Error Types
//!
//! Maps application errors to stable JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use perfscope_core::domain::DomainError;
use perfscope_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const NOT_READY: i32 = 4002;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const STORE_ERROR: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let code = match &err {
        AppError::TargetValidation(_) => code::VALIDATION_ERROR,
        AppError::NotFound(_) | AppError::ReportUnavailable(_) => code::NOT_FOUND,
        AppError::NotReady(_) => code::NOT_READY,
        AppError::Store(_) => code::STORE_ERROR,
        AppError::Domain(DomainError::InvalidTarget(_)) => code::VALIDATION_ERROR,
        AppError::Domain(DomainError::JobNotFound(_)) => code::NOT_FOUND,
        AppError::Domain(_)
        | AppError::Serialization(_)
        | AppError::Config(_)
        | AppError::Internal(_) => code::INTERNAL_ERROR,
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}
