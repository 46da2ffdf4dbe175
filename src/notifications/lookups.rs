//! Facility layout and chemical response manual lookups.

use std::collections::BTreeMap;

/// Normalized facility keys known to the plant map. URLs are supplied via
/// configuration; a key without a URL resolves to no layout.
const FACILITY_KEYS: [&str; 10] = [
    "1호기보일러",
    "2호기보일러",
    "1호기터빈",
    "2호기터빈",
    "복수탈염약품저장탱크",
    "탈황폐수처리건물",
    "암모니아저장탱크",
    "부생연료유저장탱크",
    "수처리및폐수처리건물",
    "수처리및발전폐수처리건물",
];

const HYDROCHLORIC_ACID: &str = "염산(염화수소)";
const CAUSTIC_SODA: &str = "가성소다(수산화나트륨)";
const AMMONIA_KEYWORD: &str = "암모니아";

const HYDROCHLORIC_ACID_MANUAL: &str =
    "https://drive.google.com/file/d/1KMDIx1gKcgf-T_uiET-BpZv7HcnrJn7R/view?usp=sharing";
const CAUSTIC_SODA_MANUAL: &str =
    "https://drive.google.com/file/d/1xtN8Kc-Uv0g2d9Etow1NRTMt-77fNXUQ/view?usp=sharing";
const AMMONIA_MANUAL: &str =
    "https://drive.google.com/file/d/1zISJlUUAkRfLjQpeOXDTBh_IYybu8XwG/view?usp=sharing";

/// Maps free-text incident locations to facility layout drawings.
#[derive(Debug, Clone)]
pub struct LayoutDirectory {
    // Ordered: the first key matching a location wins
    entries: Vec<(String, String)>,
}

impl LayoutDirectory {
    /// Built-in facility keys with `overrides` applied on top. Override keys
    /// that are not built in are appended in key order.
    pub fn new(overrides: &BTreeMap<String, String>) -> Self {
        let mut entries: Vec<(String, String)> = FACILITY_KEYS
            .iter()
            .map(|key| (key.to_string(), String::new()))
            .collect();

        for (key, url) in overrides {
            let key = normalize(key);
            match entries.iter_mut().find(|(existing, _)| *existing == key) {
                Some(entry) => entry.1 = url.trim().to_string(),
                None => entries.push((key, url.trim().to_string())),
            }
        }

        Self { entries }
    }

    /// Layout URL for `location`, matching normalized keys as substrings in
    /// either direction.
    pub fn lookup(&self, location: &str) -> Option<&str> {
        let location = normalize(location);
        if location.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|(key, _)| location.contains(key.as_str()) || key.contains(location.as_str()))
            .map(|(_, url)| url.as_str())
            .filter(|url| !url.is_empty())
    }
}

impl Default for LayoutDirectory {
    fn default() -> Self {
        Self::new(&BTreeMap::new())
    }
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Response manual for the incident's chemical.
///
/// An explicitly selected chemical wins; otherwise ammonia is recognised from
/// the location or incident type.
pub fn chemical_manual_url(
    selected_chemical: Option<&str>,
    location: &str,
    incident_type: &str,
) -> Option<&'static str> {
    match selected_chemical.map(str::trim) {
        Some(HYDROCHLORIC_ACID) => return Some(HYDROCHLORIC_ACID_MANUAL),
        Some(CAUSTIC_SODA) => return Some(CAUSTIC_SODA_MANUAL),
        _ => {}
    }

    if location.contains(AMMONIA_KEYWORD) || incident_type.contains(AMMONIA_KEYWORD) {
        return Some(AMMONIA_MANUAL);
    }

    None
}
