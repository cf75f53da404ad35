use serde::Serialize;

/// Counters updated once per assessment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SafetyStats {
    pub total_actions: u64,
    pub blocked_actions: u64,
    pub confirmed_actions: u64,
    pub auto_executed_actions: u64,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub counts: SafetyStats,
    pub auto_execution_rate: f64,
    pub confirmation_rate: f64,
    pub block_rate: f64,
}

impl SafetyStats {
    pub(crate) fn record(&mut self, blocked: bool, requires_confirmation: bool) {
        self.total_actions += 1;
        if blocked {
            self.blocked_actions += 1;
        } else if requires_confirmation {
            self.confirmed_actions += 1;
        } else {
            self.auto_executed_actions += 1;
        }
    }

    pub fn report(&self) -> StatsReport {
        let rate = |count: u64| {
            if self.total_actions == 0 {
                0.0
            } else {
                count as f64 / self.total_actions as f64
            }
        };
        StatsReport {
            counts: *self,
            auto_execution_rate: rate(self.auto_executed_actions),
            confirmation_rate: rate(self.confirmed_actions),
            block_rate: rate(self.blocked_actions),
        }
    }
}
