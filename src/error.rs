use std::fmt;

#[derive(Debug)]
pub enum AgreementError {
    Serialization(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for AgreementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgreementError::Serialization(message) => {
                write!(f, "document serialization failed: {}", message)
            }
            AgreementError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            AgreementError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for AgreementError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgreementError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AgreementError {
    fn from(value: std::io::Error) -> Self {
        AgreementError::Io(value)
    }
}
