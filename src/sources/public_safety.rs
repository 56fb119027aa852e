// src/sources/public_safety.rs
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use std::time::Duration;

use super::{draw, random_location, EventGenerator};
use crate::config::{AreaConfig, FeedConfig};
use crate::event::{EventRecord, MetricValue, Payload, Source};

const DEFAULT_KEYWORDS: [&str; 3] = ["fire", "accident", "protest"];
const INCIDENT_TYPES: [&str; 4] = ["fire", "accident", "medical", "crime"];
const INCIDENT_NOTES: [&str; 4] = [
    "Multiple vehicles involved",
    "Units dispatched",
    "Caller reports smoke",
    "Crowd gathering",
];

/// Geotagged posts mentioning an emergency keyword.
pub struct SocialMediaGenerator {
    area: AreaConfig,
    keywords: Vec<String>,
    interval: Duration,
}

impl SocialMediaGenerator {
    pub fn new(area: AreaConfig, feed: &FeedConfig) -> Self {
        let keywords = if feed.keywords.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            feed.keywords.clone()
        };
        Self {
            area,
            keywords,
            interval: feed.interval_or(Duration::from_secs(1)),
        }
    }

    fn keyword(&self, rng: &mut dyn RngCore) -> String {
        self.keywords
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| DEFAULT_KEYWORDS[0].to_string())
    }
}

impl EventGenerator for SocialMediaGenerator {
    fn source(&self) -> Source {
        Source::SocialMedia
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn generate(&self, rng: &mut dyn RngCore) -> EventRecord {
        let mut payload = Payload::new();
        payload.insert(
            "text".into(),
            format!("Emergency near downtown: {}", self.keyword(rng)).into(),
        );
        payload.insert(
            "user".into(),
            format!("citizen{}", rng.random_range(100..1000)).into(),
        );
        payload.insert(
            "hashtags".into(),
            MetricValue::List(vec![format!("#{}", self.keyword(rng)).into()]),
        );
        EventRecord::now(self.source(), payload, random_location(rng, &self.area))
    }
}

/// Dispatch/scanner style incident reports.
pub struct PublicSafetyGenerator {
    area: AreaConfig,
    interval: Duration,
}

impl PublicSafetyGenerator {
    pub fn new(area: AreaConfig, feed: &FeedConfig) -> Self {
        Self {
            area,
            interval: feed.interval_or(Duration::from_secs(2)),
        }
    }
}

impl EventGenerator for PublicSafetyGenerator {
    fn source(&self) -> Source {
        Source::PublicSafety
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn generate(&self, rng: &mut dyn RngCore) -> EventRecord {
        let kind = INCIDENT_TYPES.choose(rng).copied().unwrap_or("fire");
        let note = INCIDENT_NOTES.choose(rng).copied().unwrap_or_default();

        let mut payload = Payload::new();
        payload.insert("type".into(), kind.into());
        payload.insert("priority".into(), MetricValue::Int(rng.random_range(1..=5)));
        payload.insert("description".into(), note.into());
        EventRecord::now(self.source(), payload, random_location(rng, &self.area))
    }
}

/// City sensor readings; a small share is drawn from abnormal ranges and marked
/// with the simulator's own `anomaly` flag in the payload.
pub struct IotSensorGenerator {
    area: AreaConfig,
    interval: Duration,
    anomaly_probability: f64,
}

impl IotSensorGenerator {
    pub fn new(area: AreaConfig, feed: &FeedConfig) -> Self {
        Self {
            area,
            interval: feed.interval_or(Duration::from_secs(1)),
            anomaly_probability: feed.probability_or(0.05),
        }
    }
}

impl EventGenerator for IotSensorGenerator {
    fn source(&self) -> Source {
        Source::IotSensors
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn generate(&self, rng: &mut dyn RngCore) -> EventRecord {
        let abnormal = rng.random_bool(self.anomaly_probability);

        let mut payload = Payload::new();
        payload.insert(
            "noise_level".into(),
            draw(rng, abnormal, (50.0, 70.0), (80.0, 100.0)).into(),
        );
        payload.insert(
            "crowd_density".into(),
            draw(rng, abnormal, (0.1, 0.5), (0.8, 1.0)).into(),
        );
        payload.insert(
            "traffic_flow".into(),
            draw(rng, abnormal, (0.3, 0.7), (0.0, 0.2)).into(),
        );
        payload.insert("anomaly".into(), abnormal.into());
        EventRecord::now(self.source(), payload, random_location(rng, &self.area))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn social_media_uses_configured_keywords() {
        let feed = FeedConfig {
            keywords: vec!["flood".into()],
            ..FeedConfig::default()
        };
        let g = SocialMediaGenerator::new(AreaConfig::default(), &feed);
        let mut rng = StdRng::seed_from_u64(11);
        let r = g.generate(&mut rng);
        assert_eq!(r.source, Source::SocialMedia);
        assert_eq!(
            r.payload["text"],
            MetricValue::Text("Emergency near downtown: flood".into())
        );
        assert_eq!(
            r.payload["hashtags"],
            MetricValue::List(vec![MetricValue::Text("#flood".into())])
        );
    }

    #[test]
    fn incident_priority_in_range() {
        let g = PublicSafetyGenerator::new(AreaConfig::default(), &FeedConfig::default());
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let r = g.generate(&mut rng);
            let p = r.payload["priority"].as_f64().unwrap();
            assert!((1.0..=5.0).contains(&p));
        }
    }

    #[test]
    fn iot_abnormal_draws_follow_the_flag() {
        let feed = FeedConfig {
            anomaly_probability: Some(1.0),
            ..FeedConfig::default()
        };
        let g = IotSensorGenerator::new(AreaConfig::default(), &feed);
        let mut rng = StdRng::seed_from_u64(9);
        let r = g.generate(&mut rng);
        assert_eq!(r.payload["anomaly"], MetricValue::Bool(true));
        assert!(r.payload["noise_level"].as_f64().unwrap() >= 80.0);
        assert!(r.payload["traffic_flow"].as_f64().unwrap() <= 0.2);

        let feed = FeedConfig {
            anomaly_probability: Some(0.0),
            ..FeedConfig::default()
        };
        let g = IotSensorGenerator::new(AreaConfig::default(), &feed);
        let r = g.generate(&mut rng);
        assert_eq!(r.payload["anomaly"], MetricValue::Bool(false));
        let noise = r.payload["noise_level"].as_f64().unwrap();
        assert!((50.0..=70.0).contains(&noise));
    }

    #[test]
    fn iot_interval_honours_simulation_rate() {
        let feed = FeedConfig {
            interval_secs: Some(0.5),
            ..FeedConfig::default()
        };
        let g = IotSensorGenerator::new(AreaConfig::default(), &feed);
        assert_eq!(g.interval(), Duration::from_millis(500));
    }
}
