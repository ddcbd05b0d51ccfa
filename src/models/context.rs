//! Audience context that parameterizes every prompt.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Career level of the person whose contributions are analyzed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Seniority {
    Junior,
    #[default]
    Mid,
    Senior,
    Staff,
    Principal,
}

/// Engineering discipline the report should speak to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Frontend,
    Backend,
    #[default]
    Fullstack,
    Devops,
    Mobile,
    Data,
    Security,
}

/// What the caller intends to do with the report.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Display,
    EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Objective {
    /// Resume bullet points and job applications.
    #[default]
    Resume,
    /// Self or manager performance review.
    PerformanceReview,
    /// Interview preparation and talking points.
    Interview,
    /// Public portfolio write-ups.
    Portfolio,
}

/// Read-only configuration supplied once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisContext {
    pub seniority: Seniority,
    pub role: Role,
    pub objective: Objective,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_of_experience: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}
