//! Inputs for manual fault reports.

use fault_record::FaultKind;
use std::error::Error;

/// A fault reported explicitly by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualFault {
    pub message: String,
    pub stack: Option<String>,
}

impl ManualFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Build a report from an error value.
    ///
    /// The error's source chain, one cause per line, stands in for a stack.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut current = error.source();
        while let Some(cause) = current {
            causes.push(format!("caused by: {cause}"));
            current = cause.source();
        }

        Self {
            message: error.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }
}

impl From<&str> for ManualFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ManualFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Extra information attached to a manual report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureContext {
    /// Overrides the default `manual` kind.
    pub kind: Option<FaultKind>,
    pub source_file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub extra: Option<serde_json::Value>,
}
