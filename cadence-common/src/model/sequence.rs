use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::{SequenceId, StepId, TemplateId};

/// A message template. `{{placeholders}}` are filled in at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub subject: String,
    pub body: String,
}

impl Template {
    #[must_use]
    pub fn new(id: impl Into<TemplateId>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// What a step does when it comes due
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// Render and send a template.
    ///
    /// `variants` are alternative templates for A/B testing. A run always
    /// picks the same variant for a given step.
    Email {
        template: TemplateId,
        #[serde(default)]
        variants: Vec<TemplateId>,
    },

    /// Send nothing; only lets time pass before the next step
    Wait,

    /// Surface a task for a human. The run holds until the task is completed.
    ManualTask {
        #[serde(default)]
        instructions: String,
    },
}

impl StepKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email { .. } => "email",
            Self::Wait => "wait",
            Self::ManualTask { .. } => "manual-task",
        }
    }
}

/// One position in a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,

    pub kind: StepKind,

    /// Days after the previous step completed (or after enrollment, for the
    /// first step)
    #[serde(default)]
    pub day_offset: u32,

    /// Time of day (UTC) to send at, on the day given by `day_offset`
    #[serde(default)]
    pub time_of_day: Option<NaiveTime>,

    /// Per-hour send cap for this step, replacing the campaign's cap
    #[serde(default)]
    pub throttle_override: Option<u32>,
}

impl Step {
    #[must_use]
    pub fn email(id: impl Into<StepId>, template: impl Into<TemplateId>, day_offset: u32) -> Self {
        Self {
            id: id.into(),
            kind: StepKind::Email {
                template: template.into(),
                variants: Vec::new(),
            },
            day_offset,
            time_of_day: None,
            throttle_override: None,
        }
    }

    #[must_use]
    pub fn wait(id: impl Into<StepId>, day_offset: u32) -> Self {
        Self {
            id: id.into(),
            kind: StepKind::Wait,
            day_offset,
            time_of_day: None,
            throttle_override: None,
        }
    }

    #[must_use]
    pub fn manual_task(id: impl Into<StepId>, instructions: impl Into<String>, day_offset: u32) -> Self {
        Self {
            id: id.into(),
            kind: StepKind::ManualTask {
                instructions: instructions.into(),
            },
            day_offset,
            time_of_day: None,
            throttle_override: None,
        }
    }

    #[must_use]
    pub const fn at(mut self, time_of_day: NaiveTime) -> Self {
        self.time_of_day = Some(time_of_day);
        self
    }

    #[must_use]
    pub const fn with_throttle_override(mut self, per_hour: u32) -> Self {
        self.throttle_override = Some(per_hour);
        self
    }

    /// Add an A/B variant template. Has no effect on non-email steps.
    #[must_use]
    pub fn with_variant(mut self, template: impl Into<TemplateId>) -> Self {
        if let StepKind::Email { variants, .. } = &mut self.kind {
            variants.push(template.into());
        }
        self
    }
}

/// An ordered list of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,

    #[serde(default)]
    pub name: String,

    pub steps: Vec<Step>,
}

impl Sequence {
    #[must_use]
    pub fn new(id: impl Into<SequenceId>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            steps,
        }
    }
}
