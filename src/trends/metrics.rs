//! Readings pulled out of OCR text, and the numbers derived for charts.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{
    BloodPressure, ChartDataPoint, GlucoseReading, ImageMetrics, KeyMetrics, MetricsStats,
    SymptomRecord, VisionInsight,
};

static GLUCOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9]{2,3})\s*mg/dl|glucose[\s:]*([0-9]{2,3})").expect("glucose pattern compiles")
});

static BLOOD_PRESSURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{2,3})/([0-9]{2,3})").expect("blood pressure pattern compiles"));

/// Glucose and blood pressure found in recognised text. Either may be absent;
/// text matching neither yields empty metrics rather than an error.
pub fn parse_readings(text: &str) -> ImageMetrics {
    let glucose = GLUCOSE.captures(text).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
    });

    let blood_pressure = BLOOD_PRESSURE.captures(text).and_then(|caps| {
        let systolic = caps.get(1)?.as_str().parse().ok()?;
        let diastolic = caps.get(2)?.as_str().parse().ok()?;
        Some(BloodPressure { systolic, diastolic })
    });

    ImageMetrics { glucose, blood_pressure }
}

/// Per-day entry counts over every record, plus one glucose reading per
/// insight that produced one.
pub fn key_metrics(records: &[SymptomRecord], insights: &[VisionInsight]) -> KeyMetrics {
    let mut metrics = KeyMetrics::default();

    for record in records {
        *metrics
            .daily_entries
            .entry(record.created_at.date_naive())
            .or_insert(0) += 1;
    }

    metrics.glucose_readings = insights
        .iter()
        .filter_map(|insight| {
            insight.metrics.glucose.map(|value| GlucoseReading {
                date: insight.date.date_naive(),
                value,
            })
        })
        .collect();

    metrics
}

pub fn stats(metrics: &KeyMetrics) -> MetricsStats {
    MetricsStats {
        active_days: metrics.daily_entries.len(),
        total_entries: metrics.daily_entries.values().sum(),
        glucose_readings: metrics.glucose_readings.len(),
    }
}

pub fn chart_points(metrics: &KeyMetrics) -> Vec<ChartDataPoint> {
    metrics
        .daily_entries
        .iter()
        .map(|(date, entries)| ChartDataPoint {
            date: *date,
            entries: *entries,
            glucose: metrics
                .glucose_readings
                .iter()
                .find(|reading| reading.date == *date)
                .map(|reading| reading.value),
        })
        .collect()
}
