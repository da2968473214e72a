//! Human facing overview page

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;

use crate::{
    config::ReleaseConfig,
    error::ReleaseServiceError,
    platform::Platform,
    types::{PlatformAsset, Snapshot},
};

const OVERVIEW_TEMPLATE: &str = "overview";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OverviewDetails {
    pub account: String,
    pub repository: String,
    pub date: String,
    pub files: BTreeMap<Platform, PlatformAsset>,
    pub version: String,
    pub release_notes: String,
    pub all_releases: String,
    pub github: String,
}

impl OverviewDetails {
    pub fn new(config: &ReleaseConfig, snapshot: &Snapshot, now: DateTime<Utc>) -> Self {
        let github = config.repository_url();
        Self {
            account: config.account.clone(),
            repository: config.repository.clone(),
            date: time_ago(snapshot.pub_date, now),
            files: snapshot.platforms.clone(),
            version: snapshot.version.clone(),
            release_notes: format!("{github}/releases/tag/{}", snapshot.version),
            all_releases: format!("{github}/releases"),
            github,
        }
    }
}

pub trait OverviewRenderer: Send + Sync {
    fn render(&self, details: &OverviewDetails) -> Result<String, ReleaseServiceError>;
}

pub struct HandlebarsOverview {
    registry: Handlebars<'static>,
}

impl HandlebarsOverview {
    pub fn new() -> Result<Self, ReleaseServiceError> {
        Self::from_template(include_str!("../templates/overview.hbs"))
    }

    pub fn from_template(template: &str) -> Result<Self, ReleaseServiceError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
            .register_template_string(OVERVIEW_TEMPLATE, template)
            .map_err(|e| ReleaseServiceError::Render(e.to_string()))?;
        Ok(Self { registry })
    }
}

impl OverviewRenderer for HandlebarsOverview {
    fn render(&self, details: &OverviewDetails) -> Result<String, ReleaseServiceError> {
        self.registry
            .render(OVERVIEW_TEMPLATE, details)
            .map_err(|e| ReleaseServiceError::Render(e.to_string()))
    }
}

/// "3 days ago" style distance between two instants
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 0 {
        return "just now".to_string();
    }

    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    let months = days / 30;
    let years = days / 365;

    let (amount, unit) = if minutes < 1 {
        return "less than a minute ago".to_string();
    } else if hours < 1 {
        (minutes, "minute")
    } else if days < 1 {
        (hours, "hour")
    } else if months < 1 {
        (days, "day")
    } else if years < 1 {
        (months, "month")
    } else {
        (years, "year")
    };

    if amount == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{amount} {unit}s ago")
    }
}
