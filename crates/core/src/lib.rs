#![forbid(unsafe_code)]

pub mod clock;
pub mod feed;
pub mod indicators;
pub mod model;
pub mod patch;
pub mod transitions;
pub mod validate;

pub mod ids {
    use thiserror::Error;

    const MAX_ID_LEN: usize = 128;

    /// Account id of the signed-in user. Ends up in URL paths and feed filters, so it is
    /// restricted to a conservative character set.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct UserId(String);

    impl UserId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn into_string(self) -> String {
            self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
            let value = value.into();
            let value = value.trim().to_string();
            validate_id(&value)?;
            Ok(Self(value))
        }
    }

    impl std::fmt::Display for UserId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Error)]
    pub enum IdError {
        #[error("id must not be empty")]
        Empty,
        #[error("id is too long")]
        TooLong,
        #[error("id contains invalid character {ch:?} at {index}")]
        InvalidChar { ch: char, index: usize },
    }

    fn validate_id(value: &str) -> Result<(), IdError> {
        if value.is_empty() {
            return Err(IdError::Empty);
        }
        if value.len() > MAX_ID_LEN {
            return Err(IdError::TooLong);
        }
        for (index, ch) in value.chars().enumerate() {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                continue;
            }
            return Err(IdError::InvalidChar { ch, index });
        }
        Ok(())
    }
}
