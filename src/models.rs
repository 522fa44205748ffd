use serde::{ Serialize, Deserialize };
use uuid::Uuid;
use chrono::{NaiveDate, NaiveTime, DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::BiWeekly => write!(f, "bi-weekly"),
            Self::Monthly => write!(f, "monthly"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationRule {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "hh_mm")]
    pub time_of_day: NaiveTime,
    pub frequency: Frequency,
    pub day_of_week: Option<u8>,
    pub day_of_month: Option<u8>,
    pub notifications_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of create and update requests; id and creation time are server-owned.
#[derive(Debug, Clone, Deserialize)]
pub struct MedicationInput {
    pub user_id: Uuid,
    pub name: String,
    #[serde(with = "hh_mm")]
    pub time_of_day: NaiveTime,
    pub frequency: Frequency,
    pub day_of_week: Option<u8>,
    pub day_of_month: Option<u8>,
    #[serde(default)]
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SymptomRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub text: Option<String>,
    pub voice_transcript: Option<String>,
    pub image_url: Option<String>,
}

impl SymptomRecord {
    /// Free text of the entry, typed text winning over a transcript.
    pub fn narrative(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.voice_transcript.as_deref().filter(|t| !t.trim().is_empty()))
    }

    pub fn image(&self) -> Option<&str> {
        self.image_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct NewSymptom {
    pub user_id: Uuid,
    pub text: Option<String>,
    pub voice_transcript: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Serialize)]
pub struct SymptomsByDate {
    pub logged_on: NaiveDate,
    pub entries: Vec<SymptomRecord>,
}

/// Lookback window of a trend analysis. Only these four are offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum AnalysisPeriod {
    Week,
    Fortnight,
    #[default]
    Month,
    Quarter,
}

impl AnalysisPeriod {
    pub fn days(self) -> u32 {
        match self {
            Self::Week => 7,
            Self::Fortnight => 14,
            Self::Month => 30,
            Self::Quarter => 90,
        }
    }
}

impl TryFrom<u32> for AnalysisPeriod {
    type Error = String;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        match days {
            7 => Ok(Self::Week),
            14 => Ok(Self::Fortnight),
            30 => Ok(Self::Month),
            90 => Ok(Self::Quarter),
            other => Err(format!("unsupported analysis period: {other} days (expected 7, 14, 30 or 90)")),
        }
    }
}

impl From<AnalysisPeriod> for u32 {
    fn from(period: AnalysisPeriod) -> Self {
        period.days()
    }
}

impl fmt::Display for AnalysisPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u32,
    pub diastolic: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetrics {
    pub glucose: Option<u32>,
    pub blood_pressure: Option<BloodPressure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionInsight {
    pub date: DateTime<Utc>,
    pub image_url: String,
    pub extracted_text: String,
    pub metrics: ImageMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub date: NaiveDate,
    pub value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetrics {
    pub daily_entries: BTreeMap<NaiveDate, u32>,
    pub glucose_readings: Vec<GlucoseReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub user_id: Uuid,
    pub period_days: AnalysisPeriod,
    pub pattern_summary: String,
    pub vision_insights: Vec<VisionInsight>,
    pub narrative_summary: String,
    pub key_metrics: KeyMetrics,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsStats {
    pub active_days: usize,
    pub total_entries: u32,
    pub glucose_readings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartDataPoint {
    pub date: NaiveDate,
    pub entries: u32,
    pub glucose: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current: u32,
    pub last_check_in: Option<NaiveDate>,
}

/// Reminder times travel as `"HH:MM"`, the way the reminder form sends them.
mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
