use std::fmt;

/// Errors raised by the domain model itself. Missing rows and conflicts
/// are reported by the store.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Metadata of a shape no accessor knows how to read.
    #[error("unknown changeset type")]
    UnknownChangesetType,

    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// MultiError
// ---------------------------------------------------------------------------

/// An ordered collection of independent failures reported together.
///
/// Used wherever one bad unit must not hide the others: argument schema
/// violations, batch publication of changeset jobs, webhook fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiError {
    errors: Vec<String>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure.
    pub fn push(&mut self, error: impl fmt::Display) {
        self.errors.push(error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// `Ok(())` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 {
            "error"
        } else {
            "errors"
        };
        write!(f, "{} {noun} occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n\t* {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl FromIterator<String> for MultiError {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}
