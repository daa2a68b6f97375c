use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APPROVED_DISTANCES: [u32; 6] = [0, 5, 10, 25, 50, 100];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchCriteria,
    pub apply: ApplyConfig,
    pub timing: TimingConfig,
    pub profile: ProfileConfig,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    pub remote: bool,
    pub experience_level: ExperienceLevels,
    pub job_types: JobTypes,
    pub date: DateWindow,
    pub distance: u32,
    pub searches: Vec<SearchTerm>,
    pub title_blacklist: Vec<String>,
    pub company_blacklist: Vec<String>,
    pub description_blacklist: Vec<String>,
    pub applicants: ApplicantThresholds,
    pub max_pages: u32,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            remote: true,
            experience_level: ExperienceLevels::default(),
            job_types: JobTypes::default(),
            date: DateWindow::default(),
            distance: 25,
            searches: Vec::new(),
            title_blacklist: Vec::new(),
            company_blacklist: Vec::new(),
            description_blacklist: Vec::new(),
            applicants: ApplicantThresholds::default(),
            max_pages: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTerm {
    pub location: String,
    pub positions: Vec<String>,
}

/// Ordered as the site numbers them in the `f_E` filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceLevels {
    pub internship: bool,
    pub entry: bool,
    pub associate: bool,
    pub mid_senior_level: bool,
    pub director: bool,
    pub executive: bool,
}

impl Default for ExperienceLevels {
    fn default() -> Self {
        Self {
            internship: false,
            entry: true,
            associate: true,
            mid_senior_level: true,
            director: false,
            executive: false,
        }
    }
}

impl ExperienceLevels {
    pub fn ordered(&self) -> [bool; 6] {
        [
            self.internship,
            self.entry,
            self.associate,
            self.mid_senior_level,
            self.director,
            self.executive,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTypes {
    pub full_time: bool,
    pub contract: bool,
    pub part_time: bool,
    pub temporary: bool,
    pub internship: bool,
    pub other: bool,
    pub volunteer: bool,
}

impl Default for JobTypes {
    fn default() -> Self {
        Self {
            full_time: true,
            contract: false,
            part_time: false,
            temporary: false,
            internship: false,
            other: false,
            volunteer: false,
        }
    }
}

impl JobTypes {
    /// Enabled types as the single-letter codes used by the `f_JT` filter.
    pub fn codes(&self) -> Vec<char> {
        [
            (self.full_time, 'F'),
            (self.contract, 'C'),
            (self.part_time, 'P'),
            (self.temporary, 'T'),
            (self.internship, 'I'),
            (self.other, 'O'),
            (self.volunteer, 'V'),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .map(|(_, code)| code)
        .collect()
    }
}

/// At most one window may be on. None on means any time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DateWindow {
    pub all_time: bool,
    pub month: bool,
    pub week: bool,
    #[serde(rename = "24_hours")]
    pub last_24_hours: bool,
}

impl DateWindow {
    /// Value of the `f_TPR` filter, or None for "any time".
    pub fn tpr_value(&self) -> Option<&'static str> {
        if self.last_24_hours {
            Some("r86400")
        } else if self.week {
            Some("r604800")
        } else if self.month {
            Some("r2592000")
        } else {
            None
        }
    }

    fn enabled_count(&self) -> usize {
        [self.all_time, self.month, self.week, self.last_24_hours]
            .iter()
            .filter(|on| **on)
            .count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicantThresholds {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl ApplicantThresholds {
    pub fn admits(&self, applicants: u32) -> bool {
        self.min.is_none_or(|min| applicants >= min) && self.max.is_none_or(|max| applicants <= max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    pub min_score: f64,
    pub use_job_score: bool,
    pub salary_expectation: Option<f64>,
    pub unfollow_companies: bool,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            min_score: 7.0,
            use_job_score: true,
            salary_expectation: None,
            unfollow_companies: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub wait_secs: u64,
    pub poll_millis: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            wait_secs: 10,
            poll_millis: 250,
        }
    }
}

impl TimingConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub model: String,
    pub resume_summary: Option<PathBuf>,
    pub resume_pdf: Option<PathBuf>,
    pub cover_letter_pdf: Option<PathBuf>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet".to_string(),
            resume_summary: None,
            resume_pdf: None,
            cover_letter_pdf: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "easy-apply") {
            proj_dirs.config_dir().join("config.yaml")
        } else {
            PathBuf::from("config.yaml")
        }
    }

    /// Where the ledger, answers and outcome logs live.
    pub fn output_dir(&self) -> PathBuf {
        if let Some(dir) = &self.output_dir {
            return dir.clone();
        }
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "easy-apply") {
            proj_dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from("easy-apply-output")
        }
    }

    pub fn validate(&self) -> Result<()> {
        let search = &self.search;
        if search.searches.is_empty() {
            return Err(anyhow!("Config must list at least one entry under search.searches"));
        }
        for term in &search.searches {
            if term.positions.is_empty() {
                return Err(anyhow!("Search for '{}' has no positions", term.location));
            }
        }
        if !APPROVED_DISTANCES.contains(&search.distance) {
            return Err(anyhow!(
                "Invalid distance {}. Allowed: {:?}",
                search.distance,
                APPROVED_DISTANCES
            ));
        }
        if search.date.enabled_count() > 1 {
            return Err(anyhow!("Only one date window may be enabled"));
        }
        if !(0.0..=10.0).contains(&self.apply.min_score) {
            return Err(anyhow!("apply.min_score must be between 0 and 10"));
        }
        if let (Some(min), Some(max)) = (search.applicants.min, search.applicants.max) {
            if min > max {
                return Err(anyhow!("applicants.min ({}) exceeds applicants.max ({})", min, max));
            }
        }
        Ok(())
    }

    pub fn sample() -> Self {
        let mut config = AppConfig::default();
        config.search.searches = vec![SearchTerm {
            location: "United States".to_string(),
            positions: vec!["Software Engineer".to_string()],
        }];
        config.search.title_blacklist = vec!["intern".to_string()];
        config.search.date.week = true;
        config
    }
}
