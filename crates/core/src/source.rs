//! Remote exposure source seam.

use async_trait::async_trait;

use crate::exposure::Exposure;

/// Errors from the exposure source. All are transient: the scheduler logs
/// them and retries on the next poll.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("exposure source unavailable: {0}")]
    Unavailable(String),
}

/// A batch of newly arrived exposures plus the cursor to resume from.
#[derive(Debug, Clone, Default)]
pub struct NewExposures {
    /// Newly arrived exposures, in chronological order.
    pub exposures: Vec<Exposure>,
    /// Opaque resume cursor; `None` leaves the previous cursor in place.
    pub cursor: Option<String>,
}

/// Polled provider of newly arrived exposures.
#[async_trait]
pub trait ExposureSource: Send + Sync {
    /// Returns exposures that arrived after `cursor` (all of them for
    /// `None`).
    async fn get_new_exposures(
        &self,
        cursor: Option<&str>,
    ) -> Result<NewExposures, SourceError>;
}
