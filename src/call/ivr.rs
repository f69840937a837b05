use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One menu choice: the key the caller presses and where the call goes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Department {
    pub digit: String,
    pub name: String,
    pub uri: String,
}

impl Department {
    pub fn new(digit: &str, name: &str, uri: &str) -> Self {
        Self {
            digit: digit.to_string(),
            name: name.to_string(),
            uri: uri.to_string(),
        }
    }
}

pub fn default_departments() -> Vec<Department> {
    vec![
        Department::new("1", "sales", "sip:sales@example.com"),
        Department::new("2", "support", "sip:support@example.com"),
        Department::new("3", "porting", "sip:porting@example.com"),
    ]
}

/// Static digit -> department -> destination mapping.
#[derive(Debug, Clone)]
pub struct DepartmentTable {
    order: Vec<String>,
    digits: HashMap<String, String>,
    destinations: HashMap<String, String>,
}

impl DepartmentTable {
    pub fn new(departments: &[Department]) -> Result<Self> {
        validate_departments(departments)?;
        let mut order = Vec::with_capacity(departments.len());
        let mut digits = HashMap::new();
        let mut destinations = HashMap::new();
        for dept in departments {
            order.push(dept.digit.clone());
            digits.insert(dept.digit.clone(), dept.name.clone());
            destinations.insert(dept.name.clone(), dept.uri.clone());
        }
        Ok(Self {
            order,
            digits,
            destinations,
        })
    }

    /// Department for an extracted digit string. Only exact single-key
    /// matches count: "", "12" or "a" are unmapped.
    pub fn department_for(&self, digit: &str) -> Option<&str> {
        self.digits.get(digit).map(String::as_str)
    }

    pub fn destination(&self, department: &str) -> Option<&str> {
        self.destinations.get(department).map(String::as_str)
    }

    /// Keys accepted by the menu, in configured order, e.g. "123".
    pub fn valid_digits(&self) -> String {
        self.order.concat()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn remove_destination(&mut self, department: &str) {
        self.destinations.remove(department);
    }
}

impl Default for DepartmentTable {
    fn default() -> Self {
        let departments = default_departments();
        Self {
            order: departments.iter().map(|d| d.digit.clone()).collect(),
            digits: departments
                .iter()
                .map(|d| (d.digit.clone(), d.name.clone()))
                .collect(),
            destinations: departments
                .iter()
                .map(|d| (d.name.clone(), d.uri.clone()))
                .collect(),
        }
    }
}

pub fn validate_departments(departments: &[Department]) -> Result<()> {
    if departments.is_empty() {
        bail!("at least one department is required");
    }
    let mut seen_digits = HashMap::new();
    let mut seen_names = HashMap::new();
    for dept in departments {
        let mut chars = dept.digit.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_digit() => {}
            _ => bail!(
                "department {}: digit '{}' must be a single key 0-9",
                dept.name,
                dept.digit
            ),
        }
        if dept.name.trim().is_empty() {
            bail!("department for digit {} has an empty name", dept.digit);
        }
        if !dept.uri.starts_with("sip:") {
            bail!(
                "department {}: destination '{}' is not a sip: uri",
                dept.name,
                dept.uri
            );
        }
        if let Some(prev) = seen_digits.insert(dept.digit.as_str(), dept.name.as_str()) {
            bail!(
                "digit {} is assigned to both {} and {}",
                dept.digit,
                prev,
                dept.name
            );
        }
        if seen_names.insert(dept.name.as_str(), ()).is_some() {
            bail!("department {} is defined twice", dept.name);
        }
    }
    Ok(())
}

/// Prompt played while collecting the department key.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct MenuPrompt {
    pub payload: String,
    pub invalid_payload: String,
    pub payload_type: String,
    pub service_level: String,
    pub voice: String,
    pub minimum_digits: u32,
    pub maximum_digits: u32,
    pub timeout_millis: u64,
}

impl Default for MenuPrompt {
    fn default() -> Self {
        Self {
            payload: "Welcome to Telnyx Contact Center. \
                      For Sales, press 1. For Support, press 2. For Porting, press 3."
                .to_string(),
            invalid_payload: "Sorry, try again. 1 for Sales, 2 for Support, 3 for Porting."
                .to_string(),
            payload_type: "text".to_string(),
            service_level: "premium".to_string(),
            voice: "Telnyx.KokoroTTS.af".to_string(),
            minimum_digits: 1,
            maximum_digits: 1,
            timeout_millis: 8000,
        }
    }
}
