// src/sources/mod.rs
//! Synthetic feeds. Each generator produces one record per tick from fixed value
//! ranges; the manager picks the feeds for the configured mode and runs each on
//! its own task, all writing into one channel.

pub mod public_safety;
pub mod urban_planning;

use metrics::counter;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{AreaConfig, Mode, MonitorConfig};
use crate::event::{EventRecord, Location, Source};

pub use public_safety::{IotSensorGenerator, PublicSafetyGenerator, SocialMediaGenerator};
pub use urban_planning::{EnvironmentGenerator, TrafficGenerator, TransitGenerator};

/// A synthetic feed: lazy, infinite, one record per call.
pub trait EventGenerator: Send + Sync {
    fn source(&self) -> Source;
    /// Pause between records.
    fn interval(&self) -> Duration;
    fn generate(&self, rng: &mut dyn RngCore) -> EventRecord;
}

/// Uniform point inside the bounding box.
pub fn random_location(rng: &mut dyn RngCore, area: &AreaConfig) -> Location {
    Location::new(
        rng.random_range(area.lat_min..=area.lat_max),
        rng.random_range(area.lon_min..=area.lon_max),
    )
}

/// Uniform draw from the abnormal or the normal range.
pub(crate) fn draw(
    rng: &mut dyn RngCore,
    abnormal: bool,
    normal_range: (f64, f64),
    abnormal_range: (f64, f64),
) -> f64 {
    let (lo, hi) = if abnormal { abnormal_range } else { normal_range };
    rng.random_range(lo..=hi)
}

pub struct SourceManager {
    generators: Vec<Box<dyn EventGenerator>>,
}

impl SourceManager {
    pub fn new(generators: Vec<Box<dyn EventGenerator>>) -> Self {
        Self { generators }
    }

    /// Enabled feeds for the configured mode.
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        let ds = &cfg.data_sources;
        let area = cfg.area;
        let mut generators: Vec<Box<dyn EventGenerator>> = Vec::new();

        match cfg.mode {
            Mode::PublicSafety => {
                if ds.social_media.enabled {
                    generators.push(Box::new(SocialMediaGenerator::new(area, &ds.social_media)));
                }
                if ds.public_safety.enabled {
                    generators.push(Box::new(PublicSafetyGenerator::new(area, &ds.public_safety)));
                }
                if ds.iot_sensors.enabled {
                    generators.push(Box::new(IotSensorGenerator::new(area, &ds.iot_sensors)));
                }
            }
            Mode::UrbanPlanning => {
                if ds.transit.enabled {
                    generators.push(Box::new(TransitGenerator::new(area, &ds.transit)));
                }
                if ds.traffic.enabled {
                    generators.push(Box::new(TrafficGenerator::new(area, &ds.traffic)));
                }
                if ds.environment.enabled {
                    generators.push(Box::new(EnvironmentGenerator::new(area, &ds.environment)));
                }
            }
        }

        Self { generators }
    }

    pub fn sources(&self) -> Vec<Source> {
        self.generators.iter().map(|g| g.source()).collect()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// One task per feed. Tasks end once the receiver is dropped.
    pub fn spawn_all(self, tx: mpsc::Sender<EventRecord>) -> Vec<JoinHandle<()>> {
        self.generators
            .into_iter()
            .map(|g| spawn_generator(g, tx.clone(), StdRng::from_os_rng()))
            .collect()
    }
}

pub fn spawn_generator(
    generator: Box<dyn EventGenerator>,
    tx: mpsc::Sender<EventRecord>,
    mut rng: StdRng,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let source = generator.source();
        let mut ticker = tokio::time::interval(generator.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            target: "sources",
            %source,
            interval_ms = generator.interval().as_millis() as u64,
            "feed started"
        );

        loop {
            ticker.tick().await;
            let record = generator.generate(&mut rng);
            counter!("events_generated_total", "source" => source.to_string()).increment(1);
            if tx.send(record).await.is_err() {
                tracing::info!(target: "sources", %source, "pipeline closed, feed stopped");
                break;
            }
        }
    })
}
