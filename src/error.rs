pub type TrajvizResult<T> = Result<T, TrajvizError>;

#[derive(thiserror::Error, Debug)]
pub enum TrajvizError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("skeleton has no detected joints")]
    EmptySkeleton,

    #[error("format error: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrajvizError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            TrajvizError::config("x")
                .to_string()
                .contains("configuration error:")
        );
        assert!(TrajvizError::data("x").to_string().contains("data error:"));
        assert!(
            TrajvizError::format("x")
                .to_string()
                .contains("format error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = TrajvizError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
