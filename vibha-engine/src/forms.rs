//! Form schemas and field validation rules.
//!
//! A `FormSchema` describes the steps of a wizard and the fields each step
//! collects. The admission form and its one-page variant are both built from
//! the same schema type, so there is a single wizard implementation.

use crate::submission::{AdmissionRequest, Submission};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Field values keyed by field name.
pub type FieldValues = BTreeMap<String, String>;

pub const PARENT_NAME: &str = "parentName";
pub const PHONE: &str = "phone";
pub const EMAIL: &str = "email";
pub const CHILD_NAME: &str = "childName";
pub const CHILD_AGE: &str = "childAge";
pub const GRADE: &str = "grade";
pub const TOUR_DATE: &str = "tourDate";
pub const TOUR_TIME: &str = "tourTime";
pub const MESSAGE: &str = "message";

/// Grades offered, as `(value, label)`.
pub const GRADES: &[(&str, &str)] = &[
    ("nursery", "Nursery"),
    ("lkg", "LKG"),
    ("ukg", "UKG"),
    ("1st", "1st Grade"),
    ("2nd", "2nd Grade"),
    ("3rd", "3rd Grade"),
    ("4th", "4th Grade"),
    ("5th", "5th Grade"),
];

/// Campus tour slots, as `(value, label)`.
pub const TOUR_TIMES: &[(&str, &str)] = &[
    ("9am", "9:00 AM"),
    ("10am", "10:00 AM"),
    ("11am", "11:00 AM"),
    ("2pm", "2:00 PM"),
    ("3pm", "3:00 PM"),
];

pub const MIN_CHILD_AGE: u8 = 1;
pub const MAX_CHILD_AGE: u8 = 12;
pub const MIN_PHONE_DIGITS: usize = 10;
pub const MAX_PHONE_DIGITS: usize = 15;

/// The format a field's value must have once it is non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Any text.
    Text,
    Email,
    Phone,
    ChildAge,
    Grade,
    /// A `YYYY-MM-DD` calendar date.
    Date,
    TourTime,
}

impl FieldRule {
    /// Checks a non-empty value, returning the reason it was rejected.
    pub fn check(&self, value: &str) -> Result<(), String> {
        let value = value.trim();
        match self {
            FieldRule::Text => Ok(()),
            FieldRule::Email => check_email(value),
            FieldRule::Phone => check_phone(value),
            FieldRule::ChildAge => match value.parse::<u8>() {
                Ok(age) if (MIN_CHILD_AGE..=MAX_CHILD_AGE).contains(&age) => Ok(()),
                _ => Err(format!(
                    "must be a whole number from {MIN_CHILD_AGE} to {MAX_CHILD_AGE}"
                )),
            },
            FieldRule::Grade => check_choice(value, GRADES),
            FieldRule::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|_| ())
                .map_err(|_| "must be a date like 2026-04-15".to_string()),
            FieldRule::TourTime => check_choice(value, TOUR_TIMES),
        }
    }
}

/// Accepts `local@domain.tld`: one `@`, a non-empty local part, a domain with
/// a dot that is neither first nor last, and no whitespace.
pub fn check_email(value: &str) -> Result<(), String> {
    let invalid = || Err("must be an email address like name@example.com".to_string());
    if value.chars().any(char::is_whitespace) {
        return invalid();
    }
    let Some((local, domain)) = value.split_once('@') else {
        return invalid();
    };
    if local.is_empty() || domain.contains('@') {
        return invalid();
    }
    match domain.find('.') {
        Some(dot) if dot > 0 && !domain.ends_with('.') => Ok(()),
        _ => invalid(),
    }
}

/// Accepts 10 to 15 digits once spaces, dashes, parentheses and a leading `+`
/// are removed.
pub fn check_phone(value: &str) -> Result<(), String> {
    let body = value.strip_prefix('+').unwrap_or(value);
    let mut digits = 0;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            ' ' | '-' | '(' | ')' => {}
            _ => return Err("may only contain digits, spaces, dashes and parentheses".to_string()),
        }
    }
    if (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        Ok(())
    } else {
        Err(format!(
            "must have {MIN_PHONE_DIGITS} to {MAX_PHONE_DIGITS} digits"
        ))
    }
}

fn check_choice(value: &str, choices: &[(&str, &str)]) -> Result<(), String> {
    if choices.iter().any(|(choice, _)| *choice == value) {
        Ok(())
    } else {
        let allowed: Vec<&str> = choices.iter().map(|(choice, _)| *choice).collect();
        Err(format!("must be one of: {}", allowed.join(", ")))
    }
}

/// One input of a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub rule: FieldRule,
}

impl FieldSpec {
    pub const fn required(name: &'static str, label: &'static str, rule: FieldRule) -> Self {
        Self {
            name,
            label,
            required: true,
            rule,
        }
    }

    pub const fn optional(name: &'static str, label: &'static str, rule: FieldRule) -> Self {
        Self {
            name,
            label,
            required: false,
            rule,
        }
    }
}

/// A group of fields shown together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    pub title: &'static str,
    pub fields: Vec<FieldSpec>,
}

/// Why a field was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    Invalid(String),
}

/// The steps of a form and how its values become a submission.
#[derive(Debug, Clone)]
pub struct FormSchema {
    pub name: &'static str,
    pub steps: Vec<StepSpec>,
    build: fn(&FieldValues) -> Submission,
}

impl FormSchema {
    pub fn new(name: &'static str, steps: Vec<StepSpec>, build: fn(&FieldValues) -> Submission) -> Self {
        Self { name, steps, build }
    }

    /// The three-step admission enquiry with a campus tour request.
    pub fn admission() -> Arc<Self> {
        Arc::new(Self::new(
            "admission",
            vec![
                StepSpec {
                    title: "Parent Information",
                    fields: vec![
                        FieldSpec::required(PARENT_NAME, "Parent Name", FieldRule::Text),
                        FieldSpec::required(PHONE, "Phone Number", FieldRule::Phone),
                        FieldSpec::required(EMAIL, "Email Address", FieldRule::Email),
                    ],
                },
                StepSpec {
                    title: "Child Information",
                    fields: vec![
                        FieldSpec::required(CHILD_NAME, "Child Name", FieldRule::Text),
                        FieldSpec::required(CHILD_AGE, "Child Age", FieldRule::ChildAge),
                        FieldSpec::required(GRADE, "Preferred Grade", FieldRule::Grade),
                    ],
                },
                StepSpec {
                    title: "Schedule a Tour",
                    fields: vec![
                        FieldSpec::optional(TOUR_DATE, "Preferred Date", FieldRule::Date),
                        FieldSpec::optional(TOUR_TIME, "Preferred Time", FieldRule::TourTime),
                        FieldSpec::optional(MESSAGE, "Additional Message", FieldRule::Text),
                    ],
                },
            ],
            admission_submission,
        ))
    }

    /// The short single-page admission form.
    pub fn quick_admission() -> Arc<Self> {
        Arc::new(Self::new(
            "quick-admission",
            vec![StepSpec {
                title: "Admission Form",
                fields: vec![
                    FieldSpec::required(PARENT_NAME, "Parent Name", FieldRule::Text),
                    FieldSpec::required(CHILD_NAME, "Child Name", FieldRule::Text),
                    FieldSpec::required(PHONE, "Phone Number", FieldRule::Phone),
                ],
            }],
            admission_submission,
        ))
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// The 1-based step, if it exists.
    pub fn step(&self, step: usize) -> Option<&StepSpec> {
        step.checked_sub(1).and_then(|index| self.steps.get(index))
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.steps.iter().flat_map(|step| step.fields.iter())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields().find(|field| field.name == name)
    }

    /// The first problem among the fields of a 1-based step, in display order.
    pub fn check_step(&self, step: usize, values: &FieldValues) -> Option<(&FieldSpec, FieldProblem)> {
        let spec = self.step(step)?;
        spec.fields.iter().find_map(|field| {
            let value = values.get(field.name).map(|v| v.trim()).unwrap_or_default();
            if value.is_empty() {
                return field.required.then_some((field, FieldProblem::Missing));
            }
            field
                .rule
                .check(value)
                .err()
                .map(|reason| (field, FieldProblem::Invalid(reason)))
        })
    }

    pub fn to_submission(&self, values: &FieldValues) -> Submission {
        (self.build)(values)
    }
}

fn admission_submission(values: &FieldValues) -> Submission {
    let get = |name: &str| values.get(name).map(|v| v.trim().to_string()).unwrap_or_default();
    Submission::Admission(AdmissionRequest {
        parent_name: get(PARENT_NAME),
        phone: get(PHONE),
        email: get(EMAIL),
        child_name: get(CHILD_NAME),
        child_age: get(CHILD_AGE),
        grade: get(GRADE),
        tour_date: get(TOUR_DATE),
        tour_time: get(TOUR_TIME),
        message: get(MESSAGE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> FieldValues {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn admission_schema_has_three_steps() {
        let schema = FormSchema::admission();
        assert_eq!(schema.total_steps(), 3);
        assert_eq!(schema.step(1).unwrap().title, "Parent Information");
        assert_eq!(schema.step(3).unwrap().title, "Schedule a Tour");
        assert!(schema.step(0).is_none());
        assert!(schema.step(4).is_none());
        assert_eq!(schema.fields().count(), 9);
        assert!(!schema.field(MESSAGE).unwrap().required);
    }

    #[test]
    fn email_rule() {
        for ok in ["parent@example.com", "a.b+c@school.co.in"] {
            assert!(check_email(ok).is_ok(), "{ok}");
        }
        for bad in ["", "parent", "@example.com", "parent@", "parent@example", "a@b@c.com", "a b@c.com", "a@.com", "a@com."] {
            assert!(check_email(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn phone_rule() {
        for ok in ["9876543210", "+91 98765 43210", "(080) 2345-6789"] {
            assert!(check_phone(ok).is_ok(), "{ok}");
        }
        for bad in ["12345", "98765x43210", "+91 98765 43210 12345 6"] {
            assert!(check_phone(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn choice_and_range_rules() {
        assert!(FieldRule::ChildAge.check("1").is_ok());
        assert!(FieldRule::ChildAge.check(" 12 ").is_ok());
        assert!(FieldRule::ChildAge.check("0").is_err());
        assert!(FieldRule::ChildAge.check("13").is_err());
        assert!(FieldRule::ChildAge.check("four").is_err());

        assert!(FieldRule::Grade.check("ukg").is_ok());
        assert!(FieldRule::Grade.check("6th").is_err());
        assert!(FieldRule::TourTime.check("2pm").is_ok());
        assert!(FieldRule::TourTime.check("noon").is_err());
        assert!(FieldRule::Date.check("2026-04-15").is_ok());
        assert!(FieldRule::Date.check("2026-02-30").is_err());
        assert!(FieldRule::Text.check("anything at all").is_ok());
    }

    #[test]
    fn check_step_reports_first_problem_in_order() {
        let schema = FormSchema::admission();
        let (field, problem) = schema.check_step(1, &FieldValues::new()).unwrap();
        assert_eq!(field.name, PARENT_NAME);
        assert_eq!(problem, FieldProblem::Missing);

        let filled = values(&[(PARENT_NAME, "Priya"), (PHONE, "123"), (EMAIL, "nope")]);
        let (field, problem) = schema.check_step(1, &filled).unwrap();
        assert_eq!(field.name, PHONE);
        assert!(matches!(problem, FieldProblem::Invalid(_)));

        let whitespace = values(&[(PARENT_NAME, "   ")]);
        assert_eq!(schema.check_step(1, &whitespace).unwrap().1, FieldProblem::Missing);
    }

    #[test]
    fn optional_fields_are_only_checked_when_filled() {
        let schema = FormSchema::admission();
        assert!(schema.check_step(3, &FieldValues::new()).is_none());

        let bad_time = values(&[(TOUR_TIME, "midnight")]);
        let (field, _) = schema.check_step(3, &bad_time).unwrap();
        assert_eq!(field.name, TOUR_TIME);
    }

    #[test]
    fn quick_admission_is_a_single_step_variant() {
        let schema = FormSchema::quick_admission();
        assert_eq!(schema.total_steps(), 1);
        let filled = values(&[(PARENT_NAME, "Rajesh"), (CHILD_NAME, "Ananya"), (PHONE, "9876543210")]);
        assert!(schema.check_step(1, &filled).is_none());

        let Submission::Admission(request) = schema.to_submission(&filled) else {
            panic!("expected an admission submission");
        };
        assert_eq!(request.child_name, "Ananya");
        assert!(request.email.is_empty());
    }

    #[test]
    fn submission_trims_values() {
        let schema = FormSchema::admission();
        let filled = values(&[(PARENT_NAME, "  Sneha Patel "), (GRADE, "nursery")]);
        let Submission::Admission(request) = schema.to_submission(&filled) else {
            panic!("expected an admission submission");
        };
        assert_eq!(request.parent_name, "Sneha Patel");
        assert_eq!(request.grade, "nursery");
        assert!(request.tour_time.is_empty());
    }
}
