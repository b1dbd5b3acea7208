//! The multi-step form wizard state machine.
//!
//! ```text
//!  Step(1) <-prev/next-> Step(2) <-prev/next-> Step(n)
//!                                                 | begin_submit
//!                                                 v
//!                      +---- retry ---------- Submitting
//!                      |                      |        |
//!                      v              Ok      |        | Err
//!                   Failed <------------------+---> Succeeded
//!                      | edit                          | reset
//!                      v                               v
//!                   Step(n)                          Step(1)
//! ```

use crate::forms::{FieldProblem, FieldValues, FormSchema};
use crate::submission::{Receipt, SubmitError, Submission};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("step {step}: {label} is required")]
    MissingField {
        step: usize,
        field: &'static str,
        label: &'static str,
    },
    #[error("step {step}: {label} {reason}")]
    InvalidField {
        step: usize,
        field: &'static str,
        label: &'static str,
        reason: String,
    },
    #[error("submitting is only possible from the last step (on step {current} of {total})")]
    NotAtLastStep { current: usize, total: usize },
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("no submission is in flight")]
    NotSubmitting,
    #[error("there is no failed submission to retry")]
    NotFailed,
    #[error("the form is not open for editing")]
    NotEditing,
    #[error("unknown wizard session")]
    UnknownSession,
}

/// Where the wizard is in its lifecycle. The current step is tracked
/// separately and keeps its value through every status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStatus {
    Editing,
    Submitting,
    Succeeded(Receipt),
    Failed(String),
}

/// A form filled in over several steps and submitted from the last one.
#[derive(Debug, Clone)]
pub struct FormWizard {
    schema: Arc<FormSchema>,
    current_step: usize,
    fields: FieldValues,
    status: WizardStatus,
    pending: Option<Submission>,
}

impl FormWizard {
    /// Starts at step 1 with every schema field empty.
    pub fn new(schema: Arc<FormSchema>) -> Self {
        let fields = empty_fields(&schema);
        Self {
            schema,
            current_step: 1,
            fields,
            status: WizardStatus::Editing,
            pending: None,
        }
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn total_steps(&self) -> usize {
        self.schema.total_steps()
    }

    /// The 1-based current step, always within `[1, total_steps]`.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn status(&self) -> &WizardStatus {
        &self.status
    }

    pub fn fields(&self) -> &FieldValues {
        &self.fields
    }

    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step == self.total_steps()
    }

    pub fn progress_percent(&self) -> u8 {
        // current_step <= total_steps, so the result is at most 100.
        (self.current_step * 100 / self.total_steps().max(1)) as u8
    }

    /// The payload of the in-flight or last failed submission.
    pub fn pending(&self) -> Option<&Submission> {
        self.pending.as_ref()
    }

    /// Stores a value. Never fails and never validates.
    pub fn update_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Moves forward one step. Returns `false` (and changes nothing) at the
    /// last step or when the form is not being edited.
    pub fn go_next(&mut self) -> bool {
        if self.status != WizardStatus::Editing || self.is_last_step() {
            return false;
        }
        self.current_step += 1;
        true
    }

    /// Moves back one step. Returns `false` at step 1 or when not editing.
    pub fn go_prev(&mut self) -> bool {
        if self.status != WizardStatus::Editing || self.current_step == 1 {
            return false;
        }
        self.current_step -= 1;
        true
    }

    /// Checks the fields of a 1-based step.
    pub fn validate_step(&self, step: usize) -> Result<(), WizardError> {
        match self.schema.check_step(step, &self.fields) {
            None => Ok(()),
            Some((field, FieldProblem::Missing)) => Err(WizardError::MissingField {
                step,
                field: field.name,
                label: field.label,
            }),
            Some((field, FieldProblem::Invalid(reason))) => Err(WizardError::InvalidField {
                step,
                field: field.name,
                label: field.label,
                reason,
            }),
        }
    }

    /// Validates the current step, then moves forward.
    pub fn try_next(&mut self) -> Result<bool, WizardError> {
        if self.status != WizardStatus::Editing {
            return Err(WizardError::NotEditing);
        }
        self.validate_step(self.current_step)?;
        Ok(self.go_next())
    }

    /// Validates every step and moves to `Submitting`.
    ///
    /// Returns the payload to hand to the collaborator. The payload is kept
    /// so a failed submission can be retried unchanged.
    pub fn begin_submit(&mut self) -> Result<Submission, WizardError> {
        match self.status {
            WizardStatus::Editing => {}
            WizardStatus::Submitting => return Err(WizardError::SubmissionInFlight),
            WizardStatus::Succeeded(_) | WizardStatus::Failed(_) => {
                return Err(WizardError::NotEditing)
            }
        }
        if !self.is_last_step() {
            return Err(WizardError::NotAtLastStep {
                current: self.current_step,
                total: self.total_steps(),
            });
        }
        for step in 1..=self.total_steps() {
            self.validate_step(step)?;
        }

        let submission = self.schema.to_submission(&self.fields);
        self.pending = Some(submission.clone());
        self.status = WizardStatus::Submitting;
        Ok(submission)
    }

    /// Applies the collaborator's answer to the in-flight submission.
    pub fn finish_submit(&mut self, result: Result<Receipt, SubmitError>) -> Result<(), WizardError> {
        if self.status != WizardStatus::Submitting {
            return Err(WizardError::NotSubmitting);
        }
        self.status = match result {
            Ok(receipt) => {
                self.pending = None;
                WizardStatus::Succeeded(receipt)
            }
            Err(error) => WizardStatus::Failed(error.reason),
        };
        Ok(())
    }

    /// Resubmits the payload of a failed submission.
    pub fn retry(&mut self) -> Result<Submission, WizardError> {
        if !matches!(self.status, WizardStatus::Failed(_)) {
            return Err(WizardError::NotFailed);
        }
        let submission = self.pending.clone().ok_or(WizardError::NotFailed)?;
        self.status = WizardStatus::Submitting;
        Ok(submission)
    }

    /// Leaves a failed submission to correct the fields, staying on the last step.
    pub fn edit(&mut self) -> Result<(), WizardError> {
        if !matches!(self.status, WizardStatus::Failed(_)) {
            return Err(WizardError::NotFailed);
        }
        self.pending = None;
        self.status = WizardStatus::Editing;
        Ok(())
    }

    /// Clears every field and returns to step 1.
    pub fn reset(&mut self) -> Result<(), WizardError> {
        if self.status == WizardStatus::Submitting {
            return Err(WizardError::SubmissionInFlight);
        }
        self.fields = empty_fields(&self.schema);
        self.current_step = 1;
        self.status = WizardStatus::Editing;
        self.pending = None;
        Ok(())
    }
}

fn empty_fields(schema: &FormSchema) -> FieldValues {
    schema
        .fields()
        .map(|field| (field.name.to_string(), String::new()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{
        CHILD_AGE, CHILD_NAME, EMAIL, GRADE, MESSAGE, PARENT_NAME, PHONE, TOUR_TIME,
    };
    use chrono::Utc;

    fn admission() -> FormWizard {
        FormWizard::new(FormSchema::admission())
    }

    fn fill_valid(wizard: &mut FormWizard) {
        wizard.update_field(PARENT_NAME, "Priya Sharma");
        wizard.update_field(PHONE, "+91 98765 43210");
        wizard.update_field(EMAIL, "priya@example.com");
        wizard.update_field(CHILD_NAME, "Aarav");
        wizard.update_field(CHILD_AGE, "4");
        wizard.update_field(GRADE, "ukg");
        wizard.update_field(TOUR_TIME, "10am");
    }

    fn receipt() -> Receipt {
        Receipt {
            reference: "VIBHA-000001".into(),
            accepted_at: Utc::now(),
        }
    }

    #[test]
    fn starts_on_step_one_with_empty_fields() {
        let wizard = admission();
        assert_eq!(wizard.current_step(), 1);
        assert_eq!(wizard.total_steps(), 3);
        assert_eq!(wizard.status(), &WizardStatus::Editing);
        assert_eq!(wizard.fields().len(), 9);
        assert!(wizard.fields().values().all(String::is_empty));
        assert_eq!(wizard.progress_percent(), 33);
    }

    #[test]
    fn next_stops_at_last_step() {
        let mut wizard = admission();
        assert!(wizard.go_next());
        assert!(wizard.go_next());
        assert_eq!(wizard.current_step(), 3);
        assert!(!wizard.go_next());
        assert_eq!(wizard.current_step(), 3);
        assert_eq!(wizard.progress_percent(), 100);
    }

    #[test]
    fn prev_stops_at_first_step() {
        let mut wizard = admission();
        assert!(!wizard.go_prev());
        assert_eq!(wizard.current_step(), 1);
    }

    #[test]
    fn next_then_prev_round_trips_from_interior_step() {
        let mut wizard = admission();
        wizard.go_next();
        wizard.update_field(CHILD_NAME, "Ishaan");
        let before = wizard.fields().clone();

        assert!(wizard.go_next());
        assert!(wizard.go_prev());
        assert_eq!(wizard.current_step(), 2);
        assert_eq!(wizard.fields(), &before);
    }

    #[test]
    fn update_field_accepts_anything() {
        let mut wizard = admission();
        wizard.update_field(PHONE, "not a phone");
        wizard.update_field("referral", "friend");
        assert_eq!(wizard.field(PHONE), "not a phone");
        assert_eq!(wizard.field("referral"), "friend");
        assert_eq!(wizard.field("unknown"), "");
    }

    #[test]
    fn try_next_requires_current_step_fields() {
        let mut wizard = admission();
        assert_eq!(
            wizard.try_next(),
            Err(WizardError::MissingField {
                step: 1,
                field: PARENT_NAME,
                label: "Parent Name",
            })
        );
        assert_eq!(wizard.current_step(), 1);

        fill_valid(&mut wizard);
        assert_eq!(wizard.try_next(), Ok(true));
        assert_eq!(wizard.try_next(), Ok(true));
        assert_eq!(wizard.try_next(), Ok(false));
        assert_eq!(wizard.current_step(), 3);
    }

    #[test]
    fn submit_only_from_last_step() {
        let mut wizard = admission();
        fill_valid(&mut wizard);
        assert_eq!(
            wizard.begin_submit(),
            Err(WizardError::NotAtLastStep { current: 1, total: 3 })
        );
        assert_eq!(wizard.status(), &WizardStatus::Editing);
    }

    #[test]
    fn submit_validates_every_step() {
        let mut wizard = admission();
        fill_valid(&mut wizard);
        wizard.update_field(CHILD_AGE, "15");
        wizard.go_next();
        wizard.go_next();

        let error = wizard.begin_submit().unwrap_err();
        assert!(matches!(
            error,
            WizardError::InvalidField { step: 2, field: CHILD_AGE, .. }
        ));
        assert_eq!(wizard.status(), &WizardStatus::Editing);
    }

    #[test]
    fn successful_submission_then_reset() {
        let mut wizard = admission();
        fill_valid(&mut wizard);
        wizard.update_field(MESSAGE, "Can we visit on a Saturday?");
        wizard.go_next();
        wizard.go_next();

        let Submission::Admission(request) = wizard.begin_submit().unwrap() else {
            panic!("expected an admission submission");
        };
        assert_eq!(request.child_name, "Aarav");
        assert_eq!(request.message, "Can we visit on a Saturday?");
        assert_eq!(wizard.status(), &WizardStatus::Submitting);
        assert!(!wizard.go_prev());

        let receipt = receipt();
        wizard.finish_submit(Ok(receipt.clone())).unwrap();
        assert_eq!(wizard.status(), &WizardStatus::Succeeded(receipt));
        assert!(wizard.pending().is_none());

        wizard.reset().unwrap();
        assert_eq!(wizard.current_step(), 1);
        assert_eq!(wizard.status(), &WizardStatus::Editing);
        assert!(wizard.fields().values().all(String::is_empty));
    }

    #[test]
    fn second_submit_while_in_flight_is_rejected() {
        let mut wizard = admission();
        fill_valid(&mut wizard);
        wizard.go_next();
        wizard.go_next();
        wizard.begin_submit().unwrap();

        assert_eq!(wizard.begin_submit(), Err(WizardError::SubmissionInFlight));
        assert_eq!(wizard.reset(), Err(WizardError::SubmissionInFlight));
    }

    #[test]
    fn failure_can_be_retried_with_the_same_payload() {
        let mut wizard = admission();
        fill_valid(&mut wizard);
        wizard.go_next();
        wizard.go_next();
        let submitted = wizard.begin_submit().unwrap();

        wizard
            .finish_submit(Err(SubmitError::new("service unavailable")))
            .unwrap();
        assert_eq!(
            wizard.status(),
            &WizardStatus::Failed("service unavailable".into())
        );

        // Edits after the failure do not leak into the retried payload.
        wizard.update_field(CHILD_NAME, "Someone else");
        assert_eq!(wizard.retry(), Ok(submitted));
        assert_eq!(wizard.status(), &WizardStatus::Submitting);
        assert_eq!(wizard.retry(), Err(WizardError::NotFailed));
    }

    #[test]
    fn failure_can_be_edited_and_resubmitted() {
        let mut wizard = admission();
        fill_valid(&mut wizard);
        wizard.go_next();
        wizard.go_next();
        wizard.begin_submit().unwrap();
        wizard.finish_submit(Err(SubmitError::new("timeout"))).unwrap();

        wizard.edit().unwrap();
        assert_eq!(wizard.status(), &WizardStatus::Editing);
        assert_eq!(wizard.current_step(), 3);
        assert!(wizard.pending().is_none());

        wizard.update_field(CHILD_NAME, "Diya");
        let Submission::Admission(request) = wizard.begin_submit().unwrap() else {
            panic!("expected an admission submission");
        };
        assert_eq!(request.child_name, "Diya");
    }

    #[test]
    fn finish_without_submission_is_rejected() {
        let mut wizard = admission();
        assert_eq!(
            wizard.finish_submit(Ok(receipt())),
            Err(WizardError::NotSubmitting)
        );
        assert_eq!(wizard.edit(), Err(WizardError::NotFailed));
    }

    #[test]
    fn single_step_form_submits_immediately() {
        let mut wizard = FormWizard::new(FormSchema::quick_admission());
        assert!(wizard.is_last_step());
        assert_eq!(wizard.progress_percent(), 100);
        wizard.update_field(PARENT_NAME, "Amit Desai");
        wizard.update_field(CHILD_NAME, "Diya");
        wizard.update_field(PHONE, "9876543210");
        assert!(wizard.begin_submit().is_ok());
    }
}
