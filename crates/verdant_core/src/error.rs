use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerdantError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("unknown attribute: {attribute}")]
    UnknownAttribute { attribute: String },
    #[error("reference error: {attribute} does not reference an existing record")]
    Reference { attribute: String },
}

impl VerdantError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unknown_attribute(attribute: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            attribute: attribute.into(),
        }
    }

    pub fn reference(attribute: impl Into<String>) -> Self {
        Self::Reference {
            attribute: attribute.into(),
        }
    }
}

pub type VerdantResult<T> = Result<T, VerdantError>;

impl From<sea_orm::DbErr> for VerdantError {
    fn from(value: sea_orm::DbErr) -> Self {
        VerdantError::storage(value.to_string())
    }
}
