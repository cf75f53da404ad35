use std::sync::Arc;

use deskpilot_policy_center::{InMemoryPolicyCenter, PolicyCenter};
use deskpilot_safety_broker::SafetyAssessor;

use super::output::OutputFormat;

pub struct CliContext {
    policy: Arc<InMemoryPolicyCenter>,
    assessor: Arc<SafetyAssessor>,
    output: Option<OutputFormat>,
}

impl CliContext {
    pub fn new(
        policy: InMemoryPolicyCenter,
        assessor: Arc<SafetyAssessor>,
        output: Option<OutputFormat>,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            assessor,
            output,
        }
    }

    pub fn policy(&self) -> &InMemoryPolicyCenter {
        &self.policy
    }

    pub fn policy_center(&self) -> Arc<dyn PolicyCenter> {
        self.policy.clone()
    }

    pub fn assessor(&self) -> Arc<SafetyAssessor> {
        Arc::clone(&self.assessor)
    }

    /// Output format requested on the command line, or `default`.
    pub fn output_or(&self, default: OutputFormat) -> OutputFormat {
        self.output.unwrap_or(default)
    }
}
