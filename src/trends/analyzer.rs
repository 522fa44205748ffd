use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::metrics;
use super::ports::{
    AnalysisCache, NarrativeSummarizer, PatternAnalyzer, PortError, SymptomSource, TextExtractor,
};
use super::{Service, TrendError};
use crate::models::{AnalysisPeriod, ImageMetrics, SymptomRecord, TrendAnalysis, VisionInsight};

/// A stored analysis younger than this many hours is served without recomputation.
pub const FRESHNESS_WINDOW_HOURS: i64 = 24;

pub const NO_PATTERNS: &str = "No patterns identified";

#[derive(Debug, Clone, Copy)]
pub struct TrendConfig {
    /// Most images sent to the vision service per refresh.
    pub vision_batch_limit: usize,
    /// Applied to every store and service call.
    pub call_timeout: Duration,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            vision_batch_limit: 10,
            call_timeout: Duration::from_secs(30),
        }
    }
}

pub struct TrendPorts {
    pub symptoms: Arc<dyn SymptomSource>,
    pub patterns: Arc<dyn PatternAnalyzer>,
    pub vision: Arc<dyn TextExtractor>,
    pub summarizer: Arc<dyn NarrativeSummarizer>,
    pub cache: Arc<dyn AnalysisCache>,
}

type Key = (Uuid, AnalysisPeriod);

/// Per-key refresh lock plus the number of callers currently queued on it.
struct Gate {
    turn: Arc<Mutex<()>>,
    holders: usize,
}

type Gates = StdMutex<HashMap<Key, Gate>>;

/// A caller's claim on a key's gate. Dropping the last claim removes the
/// entry, so the map only holds keys with a refresh running or queued.
struct GateClaim<'a> {
    gates: &'a Gates,
    key: Key,
    turn: Arc<Mutex<()>>,
}

impl<'a> GateClaim<'a> {
    fn enter(gates: &'a Gates, key: Key) -> Self {
        let mut map = gates.lock().unwrap_or_else(PoisonError::into_inner);
        let gate = map.entry(key).or_insert_with(|| Gate { turn: Arc::default(), holders: 0 });
        gate.holders += 1;
        Self { gates, key, turn: gate.turn.clone() }
    }
}

impl Drop for GateClaim<'_> {
    fn drop(&mut self) {
        let mut map = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(gate) = map.get_mut(&self.key) {
            gate.holders -= 1;
            if gate.holders == 0 {
                map.remove(&self.key);
            }
        }
    }
}

pub struct TrendAnalyzer {
    ports: TrendPorts,
    config: TrendConfig,
    in_flight: Gates,
}

impl TrendAnalyzer {
    pub fn new(ports: TrendPorts, config: TrendConfig) -> Self {
        Self {
            ports,
            config,
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_refresh(&self, user_id: Uuid, period: AnalysisPeriod) -> Result<TrendAnalysis, TrendError> {
        self.get_or_refresh_at(user_id, period, Utc::now()).await
    }

    /// Returns the cached analysis while it is fresh at `now`, otherwise runs
    /// the full pipeline and stores the result.
    ///
    /// Concurrent refreshes of one key run one at a time; a caller that waited
    /// picks up the row the previous one stored.
    pub async fn get_or_refresh_at(
        &self,
        user_id: Uuid,
        period: AnalysisPeriod,
        now: DateTime<Utc>,
    ) -> Result<TrendAnalysis, TrendError> {
        if let Some(hit) = self.fresh(user_id, period, now).await? {
            return Ok(hit);
        }

        let claim = GateClaim::enter(&self.in_flight, (user_id, period));
        let _turn = claim.turn.lock().await;

        if let Some(hit) = self.fresh(user_id, period, now).await? {
            return Ok(hit);
        }
        self.refresh(user_id, period, now).await
    }

    /// Last stored analysis regardless of age.
    pub async fn cached(&self, user_id: Uuid, period: AnalysisPeriod) -> Result<Option<TrendAnalysis>, TrendError> {
        self.bounded("analysis cache", self.ports.cache.get_analysis(user_id, period), TrendError::Cache)
            .await
    }

    async fn fresh(
        &self,
        user_id: Uuid,
        period: AnalysisPeriod,
        now: DateTime<Utc>,
    ) -> Result<Option<TrendAnalysis>, TrendError> {
        let cached = self.cached(user_id, period).await?;
        Ok(cached.filter(|analysis| {
            let fresh = now - analysis.updated_at < TimeDelta::hours(FRESHNESS_WINDOW_HOURS);
            if fresh {
                tracing::debug!(%user_id, %period, updated_at = %analysis.updated_at, "serving cached trend analysis");
            }
            fresh
        }))
    }

    async fn refresh(
        &self,
        user_id: Uuid,
        period: AnalysisPeriod,
        now: DateTime<Utc>,
    ) -> Result<TrendAnalysis, TrendError> {
        let since = now - TimeDelta::days(i64::from(period.days()));
        let records = self
            .bounded("symptom store", self.ports.symptoms.list_symptoms(user_id, since), TrendError::Symptoms)
            .await?;
        tracing::info!(%user_id, %period, records = records.len(), "refreshing trend analysis");

        let pattern_summary = self.patterns(&records).await?;
        let vision_insights = self.vision(&records).await?;
        let narrative_summary = self
            .bounded(
                "narrative summary",
                self.ports.summarizer.summarize(&pattern_summary, &vision_insights),
                service_error(Service::Summary),
            )
            .await?;

        let analysis = TrendAnalysis {
            user_id,
            period_days: period,
            key_metrics: metrics::key_metrics(&records, &vision_insights),
            pattern_summary,
            vision_insights,
            narrative_summary,
            updated_at: now,
        };

        let stored = self
            .bounded("analysis cache", self.ports.cache.upsert_analysis(&analysis), TrendError::Cache)
            .await?;
        tracing::info!(
            %user_id,
            %period,
            active_days = stored.key_metrics.daily_entries.len(),
            glucose_readings = stored.key_metrics.glucose_readings.len(),
            "✅ trend analysis stored"
        );
        Ok(stored)
    }

    async fn patterns(&self, records: &[SymptomRecord]) -> Result<String, TrendError> {
        let lines: Vec<String> = records
            .iter()
            .filter_map(|r| r.narrative().map(|text| format!("{}: {}", r.created_at.to_rfc3339(), text)))
            .collect();
        if lines.is_empty() {
            return Ok(NO_PATTERNS.to_string());
        }

        self.bounded(
            "pattern analysis",
            self.ports.patterns.analyze_patterns(&lines.join("\n")),
            service_error(Service::Patterns),
        )
        .await
    }

    async fn vision(&self, records: &[SymptomRecord]) -> Result<Vec<VisionInsight>, TrendError> {
        let mut insights = Vec::new();

        for (record, image_url) in records
            .iter()
            .filter_map(|r| r.image().map(|url| (r, url)))
            .take(self.config.vision_batch_limit)
        {
            let extracted_text = self
                .bounded("vision", self.ports.vision.extract_text(image_url), service_error(Service::Vision))
                .await?;

            let metrics = metrics::parse_readings(&extracted_text);
            if metrics == ImageMetrics::default() {
                tracing::debug!(symptom_id = %record.id, "no readings recognised in image text");
            }

            insights.push(VisionInsight {
                date: record.created_at,
                image_url: image_url.to_string(),
                extracted_text,
                metrics,
            });
        }

        Ok(insights)
    }

    async fn bounded<T, F, W>(&self, dependency: &'static str, call: F, wrap: W) -> Result<T, TrendError>
    where
        F: Future<Output = Result<T, PortError>>,
        W: FnOnce(PortError) -> TrendError,
    {
        let after = self.config.call_timeout;
        match tokio::time::timeout(after, call).await {
            Ok(result) => result.map_err(|e| {
                tracing::error!(dependency, error = %e, "❌ trend dependency failed");
                wrap(e)
            }),
            Err(_) => {
                tracing::error!(dependency, ?after, "❌ trend dependency timed out");
                Err(TrendError::Timeout { dependency, after })
            }
        }
    }
}

fn service_error(service: Service) -> impl FnOnce(PortError) -> TrendError {
    move |source| TrendError::Service { service, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    fn text_entry(created_at: DateTime<Utc>, text: &str) -> SymptomRecord {
        SymptomRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            created_at,
            text: Some(text.into()),
            voice_transcript: None,
            image_url: None,
        }
    }

    fn image_entry(created_at: DateTime<Utc>, url: &str) -> SymptomRecord {
        SymptomRecord {
            text: None,
            image_url: Some(url.into()),
            ..text_entry(created_at, "")
        }
    }

    #[derive(Default)]
    struct FakeSymptoms {
        records: Vec<SymptomRecord>,
        fail: bool,
        calls: AtomicUsize,
        since: StdMutex<Option<DateTime<Utc>>>,
    }

    #[async_trait]
    impl SymptomSource for FakeSymptoms {
        async fn list_symptoms(&self, _user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<SymptomRecord>, PortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.since.lock().unwrap() = Some(since);
            if self.fail {
                return Err(PortError::Storage("connection refused".into()));
            }
            Ok(self.records.clone())
        }
    }

    #[derive(Default)]
    struct FakePatterns {
        calls: AtomicUsize,
        seen: StdMutex<String>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl PatternAnalyzer for FakePatterns {
        async fn analyze_patterns(&self, text: &str) -> Result<String, PortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            *self.seen.lock().unwrap() = text.to_string();
            Ok("headaches cluster in the evening".into())
        }
    }

    #[derive(Default)]
    struct FakeVision {
        texts: HashMap<String, String>,
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    #[async_trait]
    impl TextExtractor for FakeVision {
        async fn extract_text(&self, image_url: &str) -> Result<String, PortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(PortError::Status { status: 403, body: "API key not valid".into() });
            }
            Ok(self.texts.get(image_url).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct FakeSummary {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl NarrativeSummarizer for FakeSummary {
        async fn summarize(&self, patterns: &str, insights: &[VisionInsight]) -> Result<String, PortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::Status { status: 429, body: "rate limited".into() });
            }
            Ok(format!("{patterns} ({} images)", insights.len()))
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        rows: StdMutex<HashMap<Key, TrendAnalysis>>,
        upserts: AtomicUsize,
        fail_upsert: bool,
    }

    #[async_trait]
    impl AnalysisCache for MemoryCache {
        async fn get_analysis(&self, user_id: Uuid, period: AnalysisPeriod) -> Result<Option<TrendAnalysis>, PortError> {
            Ok(self.rows.lock().unwrap().get(&(user_id, period)).cloned())
        }

        async fn upsert_analysis(&self, analysis: &TrendAnalysis) -> Result<TrendAnalysis, PortError> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_upsert {
                return Err(PortError::Storage("deadlock detected".into()));
            }
            self.rows
                .lock()
                .unwrap()
                .insert((analysis.user_id, analysis.period_days), analysis.clone());
            Ok(analysis.clone())
        }
    }

    struct Harness {
        symptoms: Arc<FakeSymptoms>,
        patterns: Arc<FakePatterns>,
        vision: Arc<FakeVision>,
        summary: Arc<FakeSummary>,
        cache: Arc<MemoryCache>,
        config: TrendConfig,
    }

    impl Harness {
        fn new(records: Vec<SymptomRecord>) -> Self {
            Self {
                symptoms: Arc::new(FakeSymptoms { records, ..Default::default() }),
                patterns: Arc::default(),
                vision: Arc::default(),
                summary: Arc::default(),
                cache: Arc::default(),
                config: TrendConfig::default(),
            }
        }

        fn analyzer(&self) -> TrendAnalyzer {
            TrendAnalyzer::new(
                TrendPorts {
                    symptoms: self.symptoms.clone(),
                    patterns: self.patterns.clone(),
                    vision: self.vision.clone(),
                    summarizer: self.summary.clone(),
                    cache: self.cache.clone(),
                },
                self.config,
            )
        }

        fn service_calls(&self) -> usize {
            self.patterns.calls.load(Ordering::SeqCst)
                + self.vision.calls.load(Ordering::SeqCst)
                + self.summary.calls.load(Ordering::SeqCst)
        }
    }

    fn mixed_week() -> Vec<SymptomRecord> {
        vec![
            text_entry(at(1, 9), "headache"),
            image_entry(at(1, 13), "https://img.example/1.jpg"),
            text_entry(at(3, 18), "headache again"),
        ]
    }

    #[tokio::test]
    async fn refresh_derives_metrics_and_stores_result() {
        let mut harness = Harness::new(mixed_week());
        harness.vision = Arc::new(FakeVision {
            texts: HashMap::from([("https://img.example/1.jpg".to_string(), "Glucose: 118".to_string())]),
            ..Default::default()
        });
        let user = Uuid::new_v4();
        let now = at(7, 12);

        let analysis = harness
            .analyzer()
            .get_or_refresh_at(user, AnalysisPeriod::Week, now)
            .await
            .unwrap();

        let day = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();
        assert_eq!(
            analysis.key_metrics.daily_entries.clone().into_iter().collect::<Vec<_>>(),
            vec![(day(1), 2), (day(3), 1)]
        );
        assert_eq!(analysis.key_metrics.glucose_readings.len(), 1);
        assert_eq!(analysis.key_metrics.glucose_readings[0].value, 118);
        assert_eq!(analysis.pattern_summary, "headaches cluster in the evening");
        assert_eq!(analysis.narrative_summary, "headaches cluster in the evening (1 images)");
        assert_eq!(analysis.updated_at, now);

        let seen = harness.patterns.seen.lock().unwrap().clone();
        assert_eq!(seen.lines().count(), 2);
        assert!(seen.starts_with("2024-06-01T09:00:00+00:00: headache"));
        assert_eq!(*harness.symptoms.since.lock().unwrap(), Some(now - TimeDelta::days(7)));
        assert_eq!(harness.cache.upserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_call_within_window_uses_cache_only() {
        let harness = Harness::new(mixed_week());
        let analyzer = harness.analyzer();
        let user = Uuid::new_v4();

        let first = analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(7, 12)).await.unwrap();
        let calls = harness.service_calls();
        let second = analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(8, 11)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(harness.service_calls(), calls);
        assert_eq!(harness.symptoms.calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.cache.upserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_analysis_is_recomputed() {
        let harness = Harness::new(mixed_week());
        let analyzer = harness.analyzer();
        let user = Uuid::new_v4();

        analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(7, 12)).await.unwrap();
        let refreshed = analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(8, 12)).await.unwrap();

        assert_eq!(refreshed.updated_at, at(8, 12));
        assert_eq!(harness.symptoms.calls.load(Ordering::SeqCst), 2);
        assert_eq!(harness.patterns.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn periods_are_cached_independently() {
        let harness = Harness::new(mixed_week());
        let analyzer = harness.analyzer();
        let user = Uuid::new_v4();

        let week = analyzer.get_or_refresh_at(user, AnalysisPeriod::Week, at(7, 12)).await.unwrap();
        analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(7, 13)).await.unwrap();
        analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(9, 13)).await.unwrap();

        assert_eq!(analyzer.cached(user, AnalysisPeriod::Week).await.unwrap(), Some(week));
        assert_eq!(
            analyzer.cached(user, AnalysisPeriod::Month).await.unwrap().unwrap().updated_at,
            at(9, 13)
        );
        assert_eq!(harness.cache.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreadable_image_is_skipped_but_refresh_completes() {
        let urls: Vec<String> = (0..5).map(|i| format!("https://img.example/{i}.jpg")).collect();
        let mut harness = Harness::new(
            urls.iter().enumerate().map(|(i, url)| image_entry(at(1 + i as u32, 8), url)).collect(),
        );
        let mut texts = HashMap::new();
        for (i, url) in urls.iter().enumerate() {
            let text = if i == 2 { "smudged".to_string() } else { format!("{} mg/dL", 100 + i) };
            texts.insert(url.clone(), text);
        }
        harness.vision = Arc::new(FakeVision { texts, ..Default::default() });
        let user = Uuid::new_v4();

        let analysis = harness
            .analyzer()
            .get_or_refresh_at(user, AnalysisPeriod::Month, at(10, 8))
            .await
            .unwrap();

        let values: Vec<u32> = analysis.key_metrics.glucose_readings.iter().map(|g| g.value).collect();
        assert_eq!(values, vec![100, 101, 103, 104]);
        assert_eq!(analysis.vision_insights.len(), 5);
        assert!(harness.cache.rows.lock().unwrap().contains_key(&(user, AnalysisPeriod::Month)));
    }

    #[tokio::test]
    async fn vision_batch_is_capped() {
        let records = (0..12)
            .map(|i| image_entry(at(1, i), &format!("https://img.example/{i}.jpg")))
            .collect();
        let harness = Harness::new(records);

        let analysis = harness
            .analyzer()
            .get_or_refresh_at(Uuid::new_v4(), AnalysisPeriod::Month, at(10, 8))
            .await
            .unwrap();

        assert_eq!(harness.vision.calls.load(Ordering::SeqCst), 10);
        assert_eq!(analysis.vision_insights.len(), 10);
        assert_eq!(analysis.key_metrics.daily_entries.values().sum::<u32>(), 12);
    }

    #[tokio::test]
    async fn no_text_entries_skips_pattern_service() {
        let harness = Harness::new(vec![image_entry(at(1, 8), "https://img.example/a.jpg")]);

        let analysis = harness
            .analyzer()
            .get_or_refresh_at(Uuid::new_v4(), AnalysisPeriod::Week, at(3, 8))
            .await
            .unwrap();

        assert_eq!(analysis.pattern_summary, NO_PATTERNS);
        assert_eq!(harness.patterns.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.summary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_service_keeps_previous_analysis() {
        let mut harness = Harness::new(mixed_week());
        let user = Uuid::new_v4();
        let previous = harness
            .analyzer()
            .get_or_refresh_at(user, AnalysisPeriod::Week, at(5, 8))
            .await
            .unwrap();

        harness.summary = Arc::new(FakeSummary { fail: true, ..Default::default() });
        let analyzer = harness.analyzer();
        let err = analyzer
            .get_or_refresh_at(user, AnalysisPeriod::Week, at(7, 8))
            .await
            .unwrap_err();

        assert!(matches!(err, TrendError::Service { service: Service::Summary, .. }));
        assert_eq!(harness.cache.upserts.load(Ordering::SeqCst), 1);
        assert_eq!(analyzer.cached(user, AnalysisPeriod::Week).await.unwrap(), Some(previous));
    }

    #[tokio::test]
    async fn symptom_read_failure_aborts_before_services() {
        let mut harness = Harness::new(Vec::new());
        harness.symptoms = Arc::new(FakeSymptoms { fail: true, ..Default::default() });

        let err = harness
            .analyzer()
            .get_or_refresh_at(Uuid::new_v4(), AnalysisPeriod::Week, at(7, 8))
            .await
            .unwrap_err();

        assert!(matches!(err, TrendError::Symptoms(PortError::Storage(_))));
        assert_eq!(harness.service_calls(), 0);
        assert_eq!(harness.cache.upserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_service_times_out_without_saving() {
        let mut harness = Harness::new(mixed_week());
        harness.vision = Arc::new(FakeVision { delay: Some(Duration::from_secs(120)), ..Default::default() });

        let err = harness
            .analyzer()
            .get_or_refresh_at(Uuid::new_v4(), AnalysisPeriod::Week, at(7, 8))
            .await
            .unwrap_err();

        assert!(matches!(err, TrendError::Timeout { dependency: "vision", .. }));
        assert_eq!(harness.summary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.cache.upserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_of_one_key_run_pipeline_once() {
        let mut harness = Harness::new(mixed_week());
        harness.patterns = Arc::new(FakePatterns { delay: Some(Duration::from_secs(2)), ..Default::default() });
        let analyzer = harness.analyzer();
        let user = Uuid::new_v4();

        let (a, b) = tokio::join!(
            analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(7, 8)),
            analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(7, 8)),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(harness.patterns.calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.cache.upserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn vision_error_aborts_refresh() {
        let mut harness = Harness::new(mixed_week());
        harness.vision = Arc::new(FakeVision { fail: true, ..Default::default() });

        let err = harness
            .analyzer()
            .get_or_refresh_at(Uuid::new_v4(), AnalysisPeriod::Week, at(7, 8))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TrendError::Service { service: Service::Vision, source: PortError::Status { status: 403, .. } }
        ));
        assert_eq!(harness.summary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.cache.upserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_write_failure_is_reported() {
        let mut harness = Harness::new(mixed_week());
        harness.cache = Arc::new(MemoryCache { fail_upsert: true, ..Default::default() });
        let user = Uuid::new_v4();
        let analyzer = harness.analyzer();

        let err = analyzer
            .get_or_refresh_at(user, AnalysisPeriod::Week, at(7, 8))
            .await
            .unwrap_err();

        assert!(matches!(err, TrendError::Cache(PortError::Storage(_))));
        assert_eq!(harness.summary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(analyzer.cached(user, AnalysisPeriod::Week).await.unwrap(), None);
    }

    #[tokio::test]
    async fn finished_refreshes_release_their_gates() {
        let harness = Harness::new(mixed_week());
        let analyzer = harness.analyzer();

        for _ in 0..100 {
            analyzer.get_or_refresh_at(Uuid::new_v4(), AnalysisPeriod::Week, at(7, 8)).await.unwrap();
        }
        let user = Uuid::new_v4();
        let (a, b) = tokio::join!(
            analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(7, 8)),
            analyzer.get_or_refresh_at(user, AnalysisPeriod::Month, at(7, 8)),
        );
        a.unwrap();
        b.unwrap();

        assert!(analyzer.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_and_abandoned_refreshes_release_their_gates() {
        let mut harness = Harness::new(mixed_week());
        harness.summary = Arc::new(FakeSummary { fail: true, ..Default::default() });
        harness.patterns = Arc::new(FakePatterns { delay: Some(Duration::from_secs(5)), ..Default::default() });
        let analyzer = harness.analyzer();

        analyzer
            .get_or_refresh_at(Uuid::new_v4(), AnalysisPeriod::Week, at(7, 8))
            .await
            .unwrap_err();
        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            analyzer.get_or_refresh_at(Uuid::new_v4(), AnalysisPeriod::Week, at(7, 8)),
        )
        .await;

        assert!(abandoned.is_err());
        assert!(analyzer.in_flight.lock().unwrap().is_empty());
    }
}
