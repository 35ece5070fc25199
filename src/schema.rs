//! # Feature Schema
//!
//! This module is the exclusive entry point for raw customer-contact input.
//! Its responsibility is to validate a structured mapping against a strict,
//! fixed schema and turn it into the typed [`Record`] consumed by the
//! preprocessing pipeline.
//!
//! - Strict schema: category lists and numeric bounds are not configurable.
//!   Training-data ingestion and the serving boundary both go through
//!   [`validate`], so the two can never drift apart.
//! - User-centric errors: failures are assumed to be caller mistakes. The
//!   [`ValidationError`] names the offending field and gives an actionable
//!   reason; validation stops at the first offending field in declaration
//!   order.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const AGE_MIN: u8 = 18;
pub const AGE_MAX: u8 = 95;
pub const CAMPAIGN_MIN: u8 = 1;
pub const CAMPAIGN_MAX: u8 = 30;
pub const BALANCE_LIMIT: f64 = 10_000_000.0;

/// Occupation of the contacted customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    Admin,
    BlueCollar,
    Entrepreneur,
    Housemaid,
    Management,
    Retired,
    SelfEmployed,
    Services,
    Student,
    Technician,
    Unemployed,
    Unknown,
}

impl Job {
    pub const ALL: [Job; 12] = [
        Job::Admin,
        Job::BlueCollar,
        Job::Entrepreneur,
        Job::Housemaid,
        Job::Management,
        Job::Retired,
        Job::SelfEmployed,
        Job::Services,
        Job::Student,
        Job::Technician,
        Job::Unemployed,
        Job::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Job::Admin => "admin.",
            Job::BlueCollar => "blue-collar",
            Job::Entrepreneur => "entrepreneur",
            Job::Housemaid => "housemaid",
            Job::Management => "management",
            Job::Retired => "retired",
            Job::SelfEmployed => "self-employed",
            Job::Services => "services",
            Job::Student => "student",
            Job::Technician => "technician",
            Job::Unemployed => "unemployed",
            Job::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|j| j.as_str() == value)
    }
}

/// Marital status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marital {
    Married,
    Single,
    Divorced,
    Unknown,
}

impl Marital {
    pub const ALL: [Marital; 4] = [
        Marital::Married,
        Marital::Single,
        Marital::Divorced,
        Marital::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Marital::Married => "married",
            Marital::Single => "single",
            Marital::Divorced => "divorced",
            Marital::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == value)
    }
}

/// Highest completed education level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Education {
    Primary,
    Secondary,
    Tertiary,
    Unknown,
}

impl Education {
    pub const ALL: [Education; 4] = [
        Education::Primary,
        Education::Secondary,
        Education::Tertiary,
        Education::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Education::Primary => "primary",
            Education::Secondary => "secondary",
            Education::Tertiary => "tertiary",
            Education::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.as_str() == value)
    }
}

/// Channel used for the campaign contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contact {
    Cellular,
    Telephone,
    Unknown,
}

impl Contact {
    pub const ALL: [Contact; 3] = [Contact::Cellular, Contact::Telephone, Contact::Unknown];

    pub fn as_str(self) -> &'static str {
        match self {
            Contact::Cellular => "cellular",
            Contact::Telephone => "telephone",
            Contact::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == value)
    }
}

/// Calendar month of the last contact, as a lowercase three-letter
/// abbreviation on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Month::Jan => "jan",
            Month::Feb => "feb",
            Month::Mar => "mar",
            Month::Apr => "apr",
            Month::May => "may",
            Month::Jun => "jun",
            Month::Jul => "jul",
            Month::Aug => "aug",
            Month::Sep => "sep",
            Month::Oct => "oct",
            Month::Nov => "nov",
            Month::Dec => "dec",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == value)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Marital {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Education {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated customer-contact observation.
///
/// A `Record` can only be obtained through [`validate`], so holding one is
/// proof that every field is inside its bound or enumeration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub age: u8,
    pub job: Job,
    pub marital: Marital,
    pub education: Education,
    pub balance: f64,
    pub housing: bool,
    pub loan: bool,
    pub contact: Contact,
    pub month: Month,
    pub campaign: u8,
}

/// The unvalidated structured mapping accepted at the transport boundary.
///
/// Field names and types match the JSON prediction request one to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub age: i64,
    pub job: String,
    pub marital: String,
    pub education: String,
    pub balance: f64,
    pub housing: bool,
    pub loan: bool,
    pub contact: String,
    pub month: String,
    pub campaign: i64,
}

/// A field-level validation failure, reported to the caller and never logged
/// as a system fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("field '{field}': {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validates a raw mapping into a [`Record`].
///
/// Pure function with no side effects. Checks fields in declaration order
/// (age, job, marital, education, balance, housing, loan, contact, month,
/// campaign) and reports the first violation.
pub fn validate(raw: &RawRecord) -> Result<Record, ValidationError> {
    let age = int_in_range(raw.age, "age", AGE_MIN, AGE_MAX)?;
    let job = category(Job::parse(&raw.job), "job", &raw.job)?;
    let marital = category(Marital::parse(&raw.marital), "marital", &raw.marital)?;
    let education = category(Education::parse(&raw.education), "education", &raw.education)?;

    if !raw.balance.is_finite() {
        return Err(ValidationError::new("balance", "must be a finite number"));
    }
    if raw.balance.abs() > BALANCE_LIMIT {
        return Err(ValidationError::new(
            "balance",
            format!("must be between -{BALANCE_LIMIT} and {BALANCE_LIMIT}"),
        ));
    }

    let contact = category(Contact::parse(&raw.contact), "contact", &raw.contact)?;
    let month = category(Month::parse(&raw.month), "month", &raw.month)?;
    let campaign = int_in_range(raw.campaign, "campaign", CAMPAIGN_MIN, CAMPAIGN_MAX)?;

    Ok(Record {
        age,
        job,
        marital,
        education,
        balance: raw.balance,
        housing: raw.housing,
        loan: raw.loan,
        contact,
        month,
        campaign,
    })
}

fn int_in_range(value: i64, field: &'static str, min: u8, max: u8) -> Result<u8, ValidationError> {
    if value < i64::from(min) || value > i64::from(max) {
        return Err(ValidationError::new(
            field,
            format!("must be an integer between {min} and {max}"),
        ));
    }
    Ok(value as u8)
}

fn category<T>(parsed: Option<T>, field: &'static str, value: &str) -> Result<T, ValidationError> {
    parsed.ok_or_else(|| ValidationError::new(field, format!("unknown category '{value}'")))
}
