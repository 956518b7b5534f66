//! # Demo Synthesizer
//!
//! Generates violation candidates for demo mode. The engine decides *when* to
//! spawn (red-phase trigger and ambient spawner); this module only supplies the
//! randomness, so a fixed seed makes a whole demo session reproducible.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::configs::DemoSettings;
use crate::models::signal::SignalPhase;
use crate::models::violation::{ViolationCandidate, DEFAULT_ROI};

/// Plates drawn from in demo mode.
pub const DEMO_PLATES: [&str; 12] = [
    "51B-12345", "59D-67890", "29A-11222", "43K-55667", "30F-99001", "36C-33445",
    "72B-77889", "51G-22334", "61H-44556", "88A-66778", "31E-88990", "77D-11223",
];

// Motorbikes dominate urban traffic two to one.
const VEHICLE_TYPES: [&str; 6] = ["MOTORBIKE", "MOTORBIKE", "MOTORBIKE", "CAR", "MOTORBIKE", "CAR"];
const CAMERA_COUNT: u32 = 3;

/// Seeded source of demo violations.
pub struct DemoSynthesizer {
    settings: DemoSettings,
    rng: Mutex<StdRng>,
}

impl DemoSynthesizer {
    /// Seeds from `settings.seed`, or from the OS when unset.
    pub fn new(settings: DemoSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { settings, rng: Mutex::new(rng) }
    }

    /// The settings in use.
    pub fn settings(&self) -> &DemoSettings {
        &self.settings
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// Jittered wait between entering red and the spawn.
    pub fn spawn_delay(&self) -> Duration {
        let lo = self.settings.min_delay_ms.min(self.settings.max_delay_ms);
        let hi = self.settings.min_delay_ms.max(self.settings.max_delay_ms);
        Duration::from_millis(self.with_rng(|rng| rng.random_range(lo..=hi)))
    }

    /// Whether entering red should schedule a spawn.
    pub fn should_spawn_on_red(&self) -> bool {
        let p = self.settings.red_spawn_probability.clamp(0.0, 1.0);
        self.with_rng(|rng| rng.random_bool(p))
    }

    /// Whether this ambient period produces a spawn.
    pub fn ambient_roll(&self) -> bool {
        let p = self.settings.ambient_probability.clamp(0.0, 1.0);
        self.with_rng(|rng| rng.random_bool(p))
    }

    /// A fresh red-light violation candidate. The ledger stamps the time.
    pub fn synthesize(&self) -> ViolationCandidate {
        self.with_rng(|rng| {
            let plate = DEMO_PLATES.choose(rng).copied().unwrap_or(DEMO_PLATES[0]);
            let vehicle_type = VEHICLE_TYPES.choose(rng).copied().unwrap_or(VEHICLE_TYPES[0]);
            let speed = (rng.random_range(6.0..22.0_f64) * 10.0).round() / 10.0;
            let confidence = rng.random_range(72..=98u32);
            let camera = rng.random_range(1..=CAMERA_COUNT);
            ViolationCandidate {
                remote_id: None,
                plate: plate.to_string(),
                vehicle_type: vehicle_type.to_string(),
                timestamp: None,
                phase: Some(SignalPhase::Red),
                speed_kmh: Some(speed),
                roi: Some(DEFAULT_ROI.to_string()),
                confidence: Some(f64::from(confidence)),
                camera: Some(format!("CAM {}", camera)),
                image_url: None,
            }
        })
    }
}
