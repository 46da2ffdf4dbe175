//! Weather observations and evacuation site recommendation.

use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{Duration as TimeDelta, NaiveDateTime, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::WeatherConfig;
use crate::models::{AlertLevel, EvacuationRecommendation, IncidentKind, WeatherSnapshot};

/// Current weather near the plant.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self) -> anyhow::Result<WeatherSnapshot>;
}

/// Picks shelters for an incident under the given weather.
pub trait EvacuationRecommender: Send + Sync {
    fn recommend(
        &self,
        alert_level: AlertLevel,
        kind: IncidentKind,
        location: &str,
        weather: &WeatherSnapshot,
    ) -> Option<EvacuationRecommendation>;
}

/// Provider used when no weather source is configured. Always fails, so
/// alerts go out without a weather block.
#[derive(Debug, Default, Clone)]
pub struct DisabledWeatherProvider;

#[async_trait]
impl WeatherProvider for DisabledWeatherProvider {
    async fn current_weather(&self) -> anyhow::Result<WeatherSnapshot> {
        Err(anyhow!("weather source is not configured"))
    }
}

const KMA_OBSERVATION_PATH: &str = "api/typ01/url/kma_sfctm2.php";
const HOURS_BACK: i64 = 3;
const ATTEMPTS_PER_HOUR: u32 = 2;
const KST_OFFSET_HOURS: i64 = 9;
const REJECTION_MARKERS: [&str; 4] = ["ERROR", "DENIED", "INVALID", "LIMIT"];

// Whitespace-separated columns of a kma_sfctm2 data line
const COL_WIND_DIRECTION: usize = 2;
const COL_WIND_SPEED: usize = 3;
const COL_TEMPERATURE: usize = 10;
const COL_HUMIDITY: usize = 12;
const COL_PRECIPITATION: usize = 14;
const COL_VISIBILITY: usize = 30;
const MIN_COLUMNS: usize = 15;

/// KMA API hub surface observations (`kma_sfctm2`).
pub struct KmaWeatherProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    station: u32,
    retry_delay: Duration,
}

impl KmaWeatherProvider {
    pub fn new(config: &WeatherConfig, timeout: Duration) -> anyhow::Result<Self> {
        let Some(api_key) = config.kma_api_key.clone() else {
            anyhow::bail!("KMA API key is not configured");
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build KMA HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{KMA_OBSERVATION_PATH}",
                config.kma_api_base.trim_end_matches('/')
            ),
            api_key,
            station: config.station,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn fetch_hour(&self, tm: &str) -> anyhow::Result<String> {
        let station = self.station.to_string();
        let mut attempt = 1;
        let response = loop {
            let result = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("tm", tm),
                    ("stn", station.as_str()),
                    ("help", "0"),
                    ("authKey", self.api_key.as_str()),
                ])
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match result {
                Ok(response) => break response,
                Err(err) if attempt < ATTEMPTS_PER_HOUR => {
                    warn!(tm, attempt, error = %err, "KMA request failed, retrying");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err).context(format!("KMA request for {tm} failed")),
            }
        };

        let body = response.text().await.context("failed to read KMA response")?;
        if body.trim().len() < 10 || REJECTION_MARKERS.iter().any(|m| body.contains(m)) {
            anyhow::bail!("KMA returned no usable observation for {tm}");
        }
        Ok(body)
    }
}

#[async_trait]
impl WeatherProvider for KmaWeatherProvider {
    async fn current_weather(&self) -> anyhow::Result<WeatherSnapshot> {
        let now = Utc::now().naive_utc() + TimeDelta::hours(KST_OFFSET_HOURS);
        let mut last_error = anyhow!("no observation hours attempted");

        for tm in observation_hours(now) {
            let body = match self.fetch_hour(&tm).await {
                Ok(body) => body,
                Err(err) => {
                    debug!(tm, error = %err, "KMA observation unavailable");
                    last_error = err;
                    continue;
                }
            };

            match parse_observation(&body) {
                Ok(snapshot) => {
                    debug!(tm, ?snapshot, "Loaded KMA observation");
                    return Ok(snapshot);
                }
                Err(err) => {
                    warn!(tm, error = %err, "Unparsable KMA observation, trying an earlier hour");
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }
}

/// `tm` parameters for the current KST hour and the preceding hours.
fn observation_hours(now_kst: NaiveDateTime) -> Vec<String> {
    (0..=HOURS_BACK)
        .map(|back| {
            (now_kst - TimeDelta::hours(back))
                .format("%Y%m%d%H00")
                .to_string()
        })
        .collect()
}

/// 8-way Korean compass label for a wind origin in degrees.
pub fn wind_direction_label(degree: f64) -> &'static str {
    const LABELS: [&str; 8] = ["북", "북동", "동", "남동", "남", "남서", "서", "북서"];
    if !degree.is_finite() || !(0.0..360.0).contains(&degree) {
        return LABELS[0];
    }
    let sector = ((degree + 22.5) / 45.0).floor() as usize % LABELS.len();
    LABELS[sector]
}

/// Sky condition derived from humidity and rainfall.
pub fn weather_condition(humidity: f64, precipitation: f64) -> &'static str {
    if precipitation > 0.0 {
        "비"
    } else if humidity > 80.0 {
        "흐림"
    } else if humidity > 60.0 {
        "구름많음"
    } else {
        "맑음"
    }
}

fn reading(values: &[&str], index: usize) -> Option<f64> {
    values
        .get(index)
        .and_then(|v| v.parse::<f64>().ok())
        // KMA marks missing readings with -9, -99, ...
        .filter(|v| *v > -9.0)
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Parses the newest data line of a `kma_sfctm2` text response.
pub fn parse_observation(body: &str) -> anyhow::Result<WeatherSnapshot> {
    let line = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .last()
        .ok_or_else(|| anyhow!("KMA response has no data line"))?;

    let values: Vec<&str> = line.split_whitespace().collect();
    if values.len() < MIN_COLUMNS {
        anyhow::bail!(
            "KMA data line has {} columns, expected at least {MIN_COLUMNS}",
            values.len()
        );
    }

    let wind_degree = reading(&values, COL_WIND_DIRECTION).unwrap_or(0.0);
    let wind_speed = reading(&values, COL_WIND_SPEED).unwrap_or(0.0);
    let temperature = values
        .get(COL_TEMPERATURE)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| *v > -50.0)
        .unwrap_or(15.0);
    let humidity = reading(&values, COL_HUMIDITY).unwrap_or(60.0);
    let precipitation = reading(&values, COL_PRECIPITATION).unwrap_or(0.0);
    let visibility_m = reading(&values, COL_VISIBILITY).unwrap_or(10_000.0);

    Ok(WeatherSnapshot {
        temperature: temperature.round(),
        humidity: humidity.round(),
        wind_speed: round_to_tenth(wind_speed),
        wind_direction: wind_direction_label(wind_degree).to_string(),
        wind_degree: wind_degree.round(),
        precipitation: round_to_tenth(precipitation),
        visibility: (visibility_m / 1000.0).round().max(1.0),
        condition: weather_condition(humidity, precipitation).to_string(),
    })
}

/// Shelter sites on the plant grid, in metres relative to the ammonia tank.
const SHELTERS: [(&str, f64, f64); 8] = [
    ("구사옥", -200.0, -100.0),
    ("종합사무동", 200.0, 100.0),
    ("동해시청 별관", -500.0, 200.0),
    ("동해웰빙타운", 300.0, -300.0),
    ("삼일고등학교", -400.0, -200.0),
    ("정라동 주민센터", 600.0, 100.0),
    ("삼화초등학교", -300.0, 300.0),
    ("미로초등학교", 400.0, 200.0),
];

/// Known hazard locations. Anything else is placed at the origin.
const HAZARD_POINTS: [(&str, f64, f64); 4] = [
    ("암모니아 저장탱크 (M-TK-01A)", 0.0, 0.0),
    ("복수탈염 염산저장탱크 (M-TK-11A)", 100.0, 50.0),
    ("부생연료유 탱크", -50.0, 100.0),
    ("수소 저장고", 50.0, -50.0),
];

const DEFAULT_SHELTER: &str = "구사옥";
const LEAK_SHELTER: &str = "구사옥";
const FIRE_SHELTER: &str = "종합사무동";
const INDOOR_MARKERS: [&str; 3] = ["실내", "건물", "센터"];

/// Scores the fixed shelter list against wind direction, distance and rain.
#[derive(Debug, Default, Clone)]
pub struct SiteScoringRecommender;

impl SiteScoringRecommender {
    fn score(
        kind: IncidentKind,
        origin: (f64, f64),
        danger: (f64, f64),
        weather: &WeatherSnapshot,
        site: &(&str, f64, f64),
    ) -> f64 {
        let (name, x, y) = *site;
        let (dx, dy) = (x - origin.0, y - origin.1);
        let mut score = 100.0;

        if kind == IncidentKind::Leak {
            // Downwind sites are exposed to the plume
            if dx * danger.0 + dy * danger.1 > 0.0 {
                score -= 40.0;
            } else {
                score += 20.0;
            }
        }

        score += (dx.hypot(dy) / 10.0).min(30.0);

        if weather.precipitation > 5.0 && INDOOR_MARKERS.iter().any(|m| name.contains(m)) {
            score += 15.0;
        }

        score
    }
}

impl EvacuationRecommender for SiteScoringRecommender {
    fn recommend(
        &self,
        alert_level: AlertLevel,
        kind: IncidentKind,
        location: &str,
        weather: &WeatherSnapshot,
    ) -> Option<EvacuationRecommendation> {
        let origin = HAZARD_POINTS
            .iter()
            .find(|(name, _, _)| *name == location)
            .map(|(_, x, y)| (*x, *y))
            .unwrap_or((0.0, 0.0));

        let radians = weather.wind_degree.to_radians();
        let danger = (
            radians.cos() * weather.wind_speed * 50.0,
            radians.sin() * weather.wind_speed * 50.0,
        );

        let mut scored: Vec<(&str, f64)> = SHELTERS
            .iter()
            .map(|site| (site.0, Self::score(kind, origin, danger, weather, site)))
            .collect();

        if alert_level == AlertLevel::Yellow {
            let designated = match kind {
                IncidentKind::Leak => LEAK_SHELTER,
                IncidentKind::FireExplosion => FIRE_SHELTER,
            };
            scored.retain(|(name, _)| *name == designated);
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let primary_site = scored
            .first()
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| DEFAULT_SHELTER.to_string());
        let alternative_sites = scored
            .iter()
            .skip(1)
            .take(3)
            .map(|(name, _)| name.to_string())
            .collect();

        Some(EvacuationRecommendation {
            route: format!(
                "{}풍 {}m/s 고려하여 {}로 대피",
                weather.wind_direction, weather.wind_speed, primary_site
            ),
            primary_site,
            alternative_sites,
            estimated_minutes: if alert_level == AlertLevel::Red { 15 } else { 10 },
            special_instructions: special_instructions(weather),
        })
    }
}

fn special_instructions(weather: &WeatherSnapshot) -> String {
    let mut warnings = Vec::new();
    if weather.wind_speed > 10.0 {
        warnings.push(format!("강풍({}m/s) 주의", weather.wind_speed));
    }
    if weather.precipitation > 0.0 {
        warnings.push(format!("강수량 {}mm - 미끄럼 주의", weather.precipitation));
    }
    if weather.visibility < 5.0 {
        warnings.push(format!("가시거리 {}km - 시야 불량", weather.visibility));
    }

    if warnings.is_empty() {
        "현재 기상 조건 양호".to_string()
    } else {
        format!("{}. 안전한 대피 경로 이용", warnings.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OBSERVATION: &str = "\
# YYMMDDHHMI STN WD WS GST_WD GST_WS PA PS PT PR TA TD HM PV RN ...
202503150800 106 45 3.5 -9 -9.0 1016.1 1017.0 -9 -9.0 12.3 2.1 55.4 7.1 -9.0 -9.0 -9.0 -9.0 -9.0 -9.0 -9.0 -9 -9 -9 -9 -9 -9 -9 -9 -9 20000 -9.0 -9
#7777END
";

    fn weather(degree: f64, speed: f64, precipitation: f64) -> WeatherSnapshot {
        WeatherSnapshot {
            temperature: 12.0,
            humidity: 55.0,
            wind_speed: speed,
            wind_direction: wind_direction_label(degree).to_string(),
            wind_degree: degree,
            precipitation,
            visibility: 10.0,
            condition: "맑음".to_string(),
        }
    }

    #[test]
    fn compass_labels() {
        assert_eq!(wind_direction_label(0.0), "북");
        assert_eq!(wind_direction_label(22.4), "북");
        assert_eq!(wind_direction_label(22.5), "북동");
        assert_eq!(wind_direction_label(90.0), "동");
        assert_eq!(wind_direction_label(200.0), "남");
        assert_eq!(wind_direction_label(300.0), "북서");
        assert_eq!(wind_direction_label(350.0), "북");
        assert_eq!(wind_direction_label(-1.0), "북");
    }

    #[test]
    fn condition_thresholds() {
        assert_eq!(weather_condition(90.0, 0.5), "비");
        assert_eq!(weather_condition(81.0, 0.0), "흐림");
        assert_eq!(weather_condition(61.0, 0.0), "구름많음");
        assert_eq!(weather_condition(60.0, 0.0), "맑음");
    }

    #[test]
    fn parses_newest_data_line() {
        let snapshot = parse_observation(OBSERVATION).unwrap();

        assert_eq!(snapshot.wind_degree, 45.0);
        assert_eq!(snapshot.wind_direction, "북동");
        assert_eq!(snapshot.wind_speed, 3.5);
        assert_eq!(snapshot.temperature, 12.0);
        assert_eq!(snapshot.humidity, 55.0);
        assert_eq!(snapshot.precipitation, 0.0);
        assert_eq!(snapshot.visibility, 20.0);
        assert_eq!(snapshot.condition, "맑음");
    }

    #[test]
    fn short_data_line_is_rejected() {
        assert!(parse_observation("202503150800 106 45 3.5").is_err());
        assert!(parse_observation("# header only\n#7777END").is_err());
    }

    #[test]
    fn observation_hours_step_back_in_kst() {
        let now = NaiveDate::from_ymd_opt(2025, 3, 15)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();
        assert_eq!(
            observation_hours(now),
            vec!["202503150100", "202503150000", "202503142300", "202503142200"]
        );
    }

    #[test]
    fn leak_prefers_upwind_sites() {
        // Wind vector points along +x: eastern sites are downwind
        let recommendation = SiteScoringRecommender
            .recommend(
                AlertLevel::Red,
                IncidentKind::Leak,
                "암모니아 저장탱크 (M-TK-01A)",
                &weather(0.0, 5.0, 0.0),
            )
            .unwrap();

        assert_eq!(recommendation.primary_site, "동해시청 별관");
        assert_eq!(
            recommendation.alternative_sites,
            vec!["삼일고등학교", "삼화초등학교", "구사옥"]
        );
        assert_eq!(recommendation.estimated_minutes, 15);
        assert_eq!(recommendation.route, "북풍 5m/s 고려하여 동해시청 별관로 대피");
        assert_eq!(recommendation.special_instructions, "현재 기상 조건 양호");
    }

    #[test]
    fn yellow_alert_uses_designated_shelter() {
        let leak = SiteScoringRecommender
            .recommend(AlertLevel::Yellow, IncidentKind::Leak, "기타", &weather(0.0, 5.0, 0.0))
            .unwrap();
        assert_eq!(leak.primary_site, "구사옥");
        assert!(leak.alternative_sites.is_empty());
        assert_eq!(leak.estimated_minutes, 10);

        let fire = SiteScoringRecommender
            .recommend(
                AlertLevel::Yellow,
                IncidentKind::FireExplosion,
                "기타",
                &weather(0.0, 5.0, 0.0),
            )
            .unwrap();
        assert_eq!(fire.primary_site, "종합사무동");
    }

    #[test]
    fn heavy_rain_favours_indoor_sites_and_warns() {
        let recommendation = SiteScoringRecommender
            .recommend(
                AlertLevel::Red,
                IncidentKind::FireExplosion,
                "수소 저장고",
                &weather(90.0, 12.0, 8.0),
            )
            .unwrap();

        assert_eq!(recommendation.primary_site, "정라동 주민센터");
        assert_eq!(
            recommendation.special_instructions,
            "강풍(12m/s) 주의, 강수량 8mm - 미끄럼 주의. 안전한 대피 경로 이용"
        );
    }

    fn config(base: &str) -> WeatherConfig {
        WeatherConfig {
            kma_api_key: Some("kma-key".to_string()),
            kma_api_base: base.to_string(),
            station: 106,
        }
    }

    #[tokio::test]
    async fn falls_back_to_earlier_hour_when_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/typ01/url/kma_sfctm2.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ERROR: no data yet"))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/typ01/url/kma_sfctm2.php"))
            .and(query_param("stn", "106"))
            .and(query_param("authKey", "kma-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OBSERVATION))
            .mount(&server)
            .await;

        let provider = KmaWeatherProvider::new(&config(&server.uri()), Duration::from_secs(5))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10));
        let snapshot = provider.current_weather().await.unwrap();

        assert_eq!(snapshot.wind_direction, "북동");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unparsable_hour_falls_back_to_earlier_hour() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/typ01/url/kma_sfctm2.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("# YYMMDDHHMI STN WD WS\n202610181200 106 45 3.2\n"),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/typ01/url/kma_sfctm2.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OBSERVATION))
            .mount(&server)
            .await;

        let provider = KmaWeatherProvider::new(&config(&server.uri()), Duration::from_secs(5))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10));
        let snapshot = provider.current_weather().await.unwrap();

        assert_eq!(snapshot.wind_direction, "북동");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_hours_surface_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = KmaWeatherProvider::new(&config(&server.uri()), Duration::from_secs(5))
            .unwrap()
            .with_retry_delay(Duration::from_millis(1));

        assert!(provider.current_weather().await.is_err());
        // four hours, two attempts each
        assert_eq!(server.received_requests().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn disabled_provider_always_fails() {
        assert!(DisabledWeatherProvider.current_weather().await.is_err());
    }
}
