//! Error handler capabilities.
//!
//! [`MapperBuilderErrorHandler`] receives build-time diagnostics from the
//! resolver. [`FieldErrorHandler`] decides, per failing field, whether a row
//! keeps going. The defaults log through `tracing` and follow the
//! configuration.

use std::sync::Arc;

use crate::config::FieldErrorPolicy;
use crate::error::{ConversionError, MapperError, MapperResult};
use crate::key::ColumnKey;

/// Build-time diagnostics
pub trait MapperBuilderErrorHandler: Send + Sync {
    /// No read or write path for a property. Returning `Ok` suppresses the
    /// error and the property is left out of the plan.
    fn accessor_not_found(&self, diagnostic: &str) -> MapperResult<()>;

    /// A column matched no property.
    fn unmapped_column(&self, column: &ColumnKey, target: &str) -> MapperResult<()>;
}

/// Default build handler: accessor errors are fatal, unmapped columns are
/// fatal only when `fail_on_unmapped` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RethrowMapperBuilderErrorHandler {
    pub fail_on_unmapped: bool,
}

impl MapperBuilderErrorHandler for RethrowMapperBuilderErrorHandler {
    fn accessor_not_found(&self, diagnostic: &str) -> MapperResult<()> {
        Err(MapperError::AccessorResolution(diagnostic.to_string()))
    }

    fn unmapped_column(&self, column: &ColumnKey, target: &str) -> MapperResult<()> {
        if self.fail_on_unmapped {
            return Err(MapperError::UnmappedColumn {
                column: column.name.clone(),
                target: target.to_string(),
            });
        }
        tracing::warn!("Column {} has no matching property on {}", column, target);
        Ok(())
    }
}

/// Outcome chosen for a failing field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorAction {
    Skip,
    UseDefault,
    Abort,
}

/// Execution-time handler for conversion failures
pub trait FieldErrorHandler: Send + Sync {
    fn on_field_error(
        &self,
        error: &ConversionError,
        column: &ColumnKey,
        target: &str,
    ) -> FieldErrorAction;
}

/// Applies a fixed [`FieldErrorPolicy`] to every failure
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyFieldErrorHandler {
    pub policy: FieldErrorPolicy,
}

impl PolicyFieldErrorHandler {
    pub fn new(policy: FieldErrorPolicy) -> Self {
        Self { policy }
    }
}

impl FieldErrorHandler for PolicyFieldErrorHandler {
    fn on_field_error(
        &self,
        error: &ConversionError,
        column: &ColumnKey,
        target: &str,
    ) -> FieldErrorAction {
        match self.policy {
            FieldErrorPolicy::Skip => {
                tracing::warn!("Skipping {} on {}: {}", column, target, error);
                FieldErrorAction::Skip
            }
            FieldErrorPolicy::Default => {
                tracing::warn!("Defaulting {} on {}: {}", column, target, error);
                FieldErrorAction::UseDefault
            }
            FieldErrorPolicy::Rethrow => FieldErrorAction::Abort,
        }
    }
}

/// Shared handlers passed to resolvers and mappers
#[derive(Clone)]
pub struct ErrorHandlers {
    pub builder: Arc<dyn MapperBuilderErrorHandler>,
    pub field: Arc<dyn FieldErrorHandler>,
}

impl ErrorHandlers {
    pub fn from_policy(fail_on_unmapped: bool, policy: FieldErrorPolicy) -> Self {
        Self {
            builder: Arc::new(RethrowMapperBuilderErrorHandler { fail_on_unmapped }),
            field: Arc::new(PolicyFieldErrorHandler::new(policy)),
        }
    }
}

impl Default for ErrorHandlers {
    fn default() -> Self {
        Self::from_policy(false, FieldErrorPolicy::default())
    }
}
