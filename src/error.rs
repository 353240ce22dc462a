pub type BackdropResult<T> = Result<T, BackdropError>;

#[derive(thiserror::Error, Debug)]
pub enum BackdropError {
    #[error("plane copy failed: {0}")]
    PlaneCopy(String),

    #[error("blur failed: {0}")]
    Blur(String),

    #[error("dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid mask: {0}")]
    InvalidMask(String),

    #[error("mask service failed: {0}")]
    MaskService(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackdropError {
    pub fn plane_copy(msg: impl Into<String>) -> Self {
        Self::PlaneCopy(msg.into())
    }

    pub fn blur(msg: impl Into<String>) -> Self {
        Self::Blur(msg.into())
    }

    pub fn invalid_mask(msg: impl Into<String>) -> Self {
        Self::InvalidMask(msg.into())
    }

    pub fn mask_service(msg: impl Into<String>) -> Self {
        Self::MaskService(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Fails with `DimensionMismatch` unless `actual` equals `expected`.
    pub fn check_dimensions(expected: (u32, u32), actual: (u32, u32)) -> BackdropResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch { expected, actual })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(BackdropError::plane_copy("x")
            .to_string()
            .contains("plane copy failed:"));
        assert!(BackdropError::blur("x").to_string().contains("blur failed:"));
        assert!(BackdropError::invalid_mask("x")
            .to_string()
            .contains("invalid mask:"));
        assert!(BackdropError::mask_service("x")
            .to_string()
            .contains("mask service failed:"));
        assert!(BackdropError::invalid_config("x")
            .to_string()
            .contains("invalid config:"));
    }

    #[test]
    fn check_dimensions_reports_both_sizes() {
        assert!(BackdropError::check_dimensions((4, 2), (4, 2)).is_ok());
        let err = BackdropError::check_dimensions((4, 2), (2, 4)).unwrap_err();
        assert!(err.to_string().contains("(4, 2)"));
        assert!(err.to_string().contains("(2, 4)"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = BackdropError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
