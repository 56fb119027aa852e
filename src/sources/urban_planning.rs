// src/sources/urban_planning.rs
use rand::{Rng, RngCore};
use std::time::Duration;

use super::{draw, random_location, EventGenerator};
use crate::config::{AreaConfig, FeedConfig};
use crate::event::{EventRecord, MetricValue, Payload, Source};

/// Bus positions and delays. Most vehicles run 0-15 min late; the rest 15-45.
pub struct TransitGenerator {
    area: AreaConfig,
    interval: Duration,
    delay_probability: f64,
}

impl TransitGenerator {
    pub fn new(area: AreaConfig, feed: &FeedConfig) -> Self {
        Self {
            area,
            interval: feed.interval_or(Duration::from_secs(3)),
            delay_probability: feed.probability_or(0.2),
        }
    }
}

impl EventGenerator for TransitGenerator {
    fn source(&self) -> Source {
        Source::Transit
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn generate(&self, rng: &mut dyn RngCore) -> EventRecord {
        let delayed = rng.random_bool(self.delay_probability);
        let stop = random_location(rng, &self.area);
        let vehicle = random_location(rng, &self.area);

        let mut payload = Payload::new();
        payload.insert(
            "route_id".into(),
            format!("M{}", rng.random_range(1..=9)).into(),
        );
        payload.insert(
            "delay".into(),
            draw(rng, delayed, (0.0, 15.0), (15.0, 45.0)).into(),
        );
        payload.insert(
            "passenger_count".into(),
            MetricValue::Int(rng.random_range(10..=200)),
        );

        let mut position = Payload::new();
        position.insert("lat".into(), vehicle.lat.into());
        position.insert("lon".into(), vehicle.lon.into());
        payload.insert("vehicle_location".into(), MetricValue::Map(position));

        EventRecord::now(self.source(), payload, stop)
    }
}

/// Road segment conditions.
pub struct TrafficGenerator {
    area: AreaConfig,
    interval: Duration,
}

impl TrafficGenerator {
    pub fn new(area: AreaConfig, feed: &FeedConfig) -> Self {
        Self {
            area,
            interval: feed.interval_or(Duration::from_secs(2)),
        }
    }
}

impl EventGenerator for TrafficGenerator {
    fn source(&self) -> Source {
        Source::Traffic
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn generate(&self, rng: &mut dyn RngCore) -> EventRecord {
        let mut payload = Payload::new();
        payload.insert(
            "congestion_level".into(),
            rng.random_range(0.1..=0.9f64).into(),
        );
        payload.insert(
            "average_speed".into(),
            rng.random_range(10.0..=40.0f64).into(),
        );
        payload.insert(
            "incident_count".into(),
            MetricValue::Int(rng.random_range(0..=5)),
        );
        EventRecord::now(self.source(), payload, random_location(rng, &self.area))
    }
}

/// Air quality station readings.
pub struct EnvironmentGenerator {
    area: AreaConfig,
    interval: Duration,
}

impl EnvironmentGenerator {
    pub fn new(area: AreaConfig, feed: &FeedConfig) -> Self {
        Self {
            area,
            interval: feed.interval_or(Duration::from_secs(5)),
        }
    }
}

impl EventGenerator for EnvironmentGenerator {
    fn source(&self) -> Source {
        Source::Environment
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn generate(&self, rng: &mut dyn RngCore) -> EventRecord {
        let mut payload = Payload::new();
        payload.insert(
            "air_quality_index".into(),
            rng.random_range(20.0..=150.0f64).into(),
        );
        payload.insert("noise_level".into(), rng.random_range(40.0..=80.0f64).into());
        payload.insert("temperature".into(), rng.random_range(15.0..=30.0f64).into());
        EventRecord::now(self.source(), payload, random_location(rng, &self.area))
    }
}
