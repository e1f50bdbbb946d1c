//! Notifier writing crossings to the log
//!
//! Used when no mail transport is configured. The message mirrors what a
//! project's members would receive.

use async_trait::async_trait;
use tracing::info;

use core_kernel::{DomainPort, PortError};
use crate::notification::{Notifier, ThresholdCrossing};

/// Logs every notification at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }

    /// Renders the text a member would read
    pub fn render(crossing: &ThresholdCrossing) -> String {
        format!(
            "Project {} has {} of {} credits left and passed the {} mark ({} credits).",
            crossing.project,
            crossing.credits_left,
            crossing.credits_granted,
            crossing.threshold,
            crossing.threshold_credits,
        )
    }
}

impl DomainPort for LogNotifier {}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, crossing: &ThresholdCrossing) -> Result<(), PortError> {
        info!(
            project = %crossing.project,
            threshold = %crossing.threshold,
            message = %Self::render(crossing),
            "Low credits notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Threshold;
    use core_kernel::{Credits, ProjectId};
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_mentions_balance_and_threshold() {
        let crossing = ThresholdCrossing {
            project: ProjectId::new("demo").unwrap(),
            threshold: Threshold::FractionOfGranted(dec!(0.5)),
            threshold_credits: Credits::new(dec!(500)),
            credits_granted: Credits::new(dec!(1000)),
            credits_used: Credits::new(dec!(501)),
            credits_left: Credits::new(dec!(499)),
        };
        let text = LogNotifier::render(&crossing);
        assert!(text.contains("demo"));
        assert!(text.contains("499 of 1000"));
        assert!(text.contains("50% of granted"));
    }
}
