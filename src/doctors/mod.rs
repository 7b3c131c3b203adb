//! Doctor directory lookups backing the `list_doctors` tool and the doctor agent.

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::DoctorsConfig;
use crate::http::{self, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Doctor {
    pub name: String,
    pub specialty: String,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub city: String,
    pub state: String,
}

impl Doctor {
    /// `"{name} ({specialty}) - {city}, {state}"`
    #[inline]
    pub fn summary(&self) -> String {
        format!(
            "{} ({}) - {}, {}",
            self.name, self.specialty, self.address.city, self.address.state
        )
    }
}

/// The published directory is an object keyed by doctor id, read in file
/// order; a bare list is accepted too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DirectoryPayload {
    Keyed(IndexMap<String, Doctor>),
    List(Vec<Doctor>),
}

impl DirectoryPayload {
    fn into_doctors(self) -> Vec<Doctor> {
        match self {
            Self::Keyed(map) => map.into_values().collect(),
            Self::List(list) => list,
        }
    }
}

/// Doctors practising in `state`, optionally restricted to `specialty`.
/// Both comparisons ignore case; at most `limit` doctors are returned.
#[inline]
pub fn filter_doctors<'a>(
    doctors: &'a [Doctor],
    state: &str,
    specialty: Option<&str>,
    limit: usize,
) -> Vec<&'a Doctor> {
    let specialty = specialty.map(str::trim).filter(|s| !s.is_empty());

    doctors
        .iter()
        .filter(|d| d.address.state.eq_ignore_ascii_case(state.trim()))
        .filter(|d| specialty.is_none_or(|s| d.specialty.eq_ignore_ascii_case(s)))
        .take(limit)
        .collect()
}

#[derive(Debug, Clone)]
pub struct DoctorDirectory {
    source_url: String,
    max_results: usize,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl DoctorDirectory {
    #[inline]
    pub fn new(config: &DoctorsConfig) -> Self {
        Self {
            source_url: config.source_url.clone(),
            max_results: config.max_results.max(1),
            agent: http::build_agent(std::time::Duration::from_secs(config.timeout_secs)),
            retry: RetryPolicy::default(),
        }
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Download and parse the whole directory
    #[inline]
    pub fn fetch_blocking(&self) -> Result<Vec<Doctor>> {
        debug!("Fetching doctor directory from {}", self.source_url);

        let body = http::send_with_retry(&self.source_url, self.retry, || {
            self.agent
                .get(self.source_url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Failed to download doctor directory")?;

        let payload: DirectoryPayload =
            serde_json::from_str(&body).context("Failed to parse doctor directory")?;
        let doctors = payload.into_doctors();

        debug!("Doctor directory lists {} doctors", doctors.len());
        Ok(doctors)
    }

    #[inline]
    pub async fn fetch(&self) -> Result<Vec<Doctor>> {
        let directory = self.clone();
        http::run_blocking(move || directory.fetch_blocking()).await
    }

    /// Human-readable lookup result. Fetch failures and empty matches are
    /// reported in the text rather than as errors.
    #[inline]
    pub async fn lookup(&self, state: &str, specialty: Option<&str>) -> String {
        let doctors = match self.fetch().await {
            Ok(doctors) => doctors,
            Err(e) => {
                warn!("Doctor directory unavailable: {:#}", e);
                return format!("Failed to fetch doctor data: {e:#}");
            }
        };

        let matches = filter_doctors(&doctors, state, specialty, self.max_results);
        if matches.is_empty() {
            return format!(
                "No doctors found in {} with specialty '{}'.",
                state,
                specialty.unwrap_or_default()
            );
        }

        let summaries: Vec<String> = matches.iter().map(|d| d.summary()).collect();
        format!("Here are some doctors:\n{}", summaries.join("\n"))
    }

    /// [`lookup`](Self::lookup) wrapped as `{"message": ...}` JSON
    #[inline]
    pub async fn list_doctors(&self, state: &str, specialty: Option<&str>) -> String {
        let message = self.lookup(state, specialty).await;
        serde_json::json!({ "message": message }).to_string()
    }
}
