//! Dispatch table: per-operation category, timeout, and cancel policy

use std::fmt;
use std::time::Duration;

use crate::config::TimeoutConfig;

/// Dosing command category. At most one request per category is in flight;
/// a same-category request issued meanwhile is rejected, not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    TempBasal,
    Bolus,
    ExtendedBolus,
    Settings,
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandCategory::TempBasal => "temp-basal",
            CommandCategory::Bolus => "bolus",
            CommandCategory::ExtendedBolus => "extended-bolus",
            CommandCategory::Settings => "settings",
        };
        f.write_str(s)
    }
}

/// Kind of operation, keying the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    StartBolus,
    CancelBolus,
    FinishBolus,
    StartTempBasal,
    CancelTempBasal,
    StartExtendedBolus,
    CancelExtendedBolus,
    UpdateBasalProgram,
    QueryStatus,
    Setting,
}

/// Dispatch policy for one operation kind
#[derive(Debug, Clone, Copy)]
pub struct OperationSpec {
    pub category: CommandCategory,
    pub timeout: Duration,
    /// Any active extended bolus / temp basal must be cancelled (through
    /// their own operations) before this one is sent
    pub cancel_active_first: bool,
    /// Attach a human-readable hint to the result when this operation
    /// times out
    pub timeout_hint: bool,
}

impl CommandKind {
    pub fn spec(self, timeouts: &TimeoutConfig) -> OperationSpec {
        use CommandCategory::*;
        use CommandKind::*;

        let entry = |category, timeout| OperationSpec {
            category,
            timeout,
            cancel_active_first: false,
            timeout_hint: false,
        };

        match self {
            // Device priming makes the immediate-bolus start the slowest
            // round trip; it is also the only one that gets a user-facing
            // timeout hint.
            StartBolus => OperationSpec {
                timeout_hint: true,
                ..entry(Bolus, timeouts.bolus_start())
            },
            CancelBolus => entry(Bolus, timeouts.settings()),
            FinishBolus => entry(Bolus, timeouts.finish_bolus()),
            StartTempBasal | CancelTempBasal => entry(TempBasal, timeouts.settings()),
            StartExtendedBolus | CancelExtendedBolus => {
                entry(ExtendedBolus, timeouts.settings())
            }
            UpdateBasalProgram => OperationSpec {
                cancel_active_first: true,
                ..entry(Settings, timeouts.basal_program())
            },
            QueryStatus | Setting => entry(Settings, timeouts.settings()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_protocol_budgets() {
        let timeouts = TimeoutConfig::default();

        let bolus = CommandKind::StartBolus.spec(&timeouts);
        assert_eq!(bolus.timeout, Duration::from_secs(20));
        assert_eq!(bolus.category, CommandCategory::Bolus);
        assert!(bolus.timeout_hint);

        let program = CommandKind::UpdateBasalProgram.spec(&timeouts);
        assert_eq!(program.timeout, Duration::from_secs(10));
        assert!(program.cancel_active_first);

        for kind in [
            CommandKind::CancelBolus,
            CommandKind::StartTempBasal,
            CommandKind::CancelTempBasal,
            CommandKind::StartExtendedBolus,
            CommandKind::CancelExtendedBolus,
            CommandKind::QueryStatus,
            CommandKind::Setting,
        ] {
            let spec = kind.spec(&timeouts);
            assert_eq!(spec.timeout, Duration::from_secs(3), "{kind:?}");
            assert!(!spec.timeout_hint, "{kind:?}");
        }
    }
}
