//! Simulated remote recipe catalog.
//!
//! Every request gets two deadlines: a reply drawn at random and a fixed
//! timeout. [`RecipeCatalog::poll`] retires the request at whichever comes
//! first and discards the other.

use embassy_time::{Duration, Instant};
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::types::{BrewOptions, GrindLevel, GrindOptions, MilkOptions};

pub const RETURN_CODE_OK: u16 = 200;
pub const RETURN_CODE_TIMEOUT: u16 = 408;

const FORCED_TIMEOUT_EXTRA_MS: u64 = 1000;

const TIMEOUT_REPLY: &str = r#"{"return_code":408,"error_message":"Request timed out."}"#;

/// Reply body served by the catalog.
pub const RECIPES_JSON: &str = r#"{
    "return_code": 200,
    "error_message": "",
    "recipes": [
        { "name": "Espresso", "beans_g": 18, "water_ml": 40, "milk_ml": 0, "foam": false },
        { "name": "Lungo", "beans_g": 18, "water_ml": 110, "milk_ml": 0, "foam": false },
        { "name": "Cappuccino", "beans_g": 18, "water_ml": 40, "milk_ml": 120, "foam": true },
        { "name": "Latte Macchiato", "beans_g": 16, "water_ml": 40, "milk_ml": 200, "foam": true },
        { "name": "Flat White", "beans_g": 20, "water_ml": 50, "milk_ml": 110, "foam": false }
    ]
}"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub beans_g: u32,
    pub water_ml: u32,
    #[serde(default)]
    pub milk_ml: u32,
    #[serde(default)]
    pub foam: bool,
}

impl Recipe {
    pub fn grind_options(&self) -> GrindOptions {
        GrindOptions::new(self.beans_g, GrindLevel::default())
    }

    pub fn brew_options(&self) -> BrewOptions {
        BrewOptions {
            water_ml: self.water_ml,
            ..BrewOptions::default()
        }
    }

    /// None for black coffee.
    pub fn milk_options(&self) -> Option<MilkOptions> {
        (self.milk_ml > 0).then(|| MilkOptions {
            milk_ml: self.milk_ml,
            foam: self.foam,
            ..MilkOptions::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogReply {
    pub return_code: u16,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
}

impl CatalogReply {
    pub fn is_ok(&self) -> bool {
        self.return_code == RETURN_CODE_OK
    }
}

/// The recipes bundled with the catalog.
pub fn bundled_recipes() -> serde_json::Result<Vec<Recipe>> {
    serde_json::from_str::<CatalogReply>(RECIPES_JSON).map(|reply| reply.recipes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogResponse {
    pub request_id: u32,
    pub json: String,
}

impl CatalogResponse {
    pub fn parse(&self) -> serde_json::Result<CatalogReply> {
        serde_json::from_str(&self.json)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    id: u32,
    reply_at: Instant,
    timeout_at: Instant,
}

impl PendingRequest {
    fn deadline(&self) -> Instant {
        self.reply_at.min(self.timeout_at)
    }

    // a reply due at the same instant as the timeout still wins
    fn replied(&self) -> bool {
        self.reply_at <= self.timeout_at
    }
}

pub struct RecipeCatalog {
    next_id: u32,
    timeout: Duration,
    rng: StdRng,
    pending: Vec<PendingRequest>,
}

impl RecipeCatalog {
    pub fn new(timeout: Duration) -> Self {
        Self::with_rng(timeout, StdRng::from_entropy())
    }

    pub fn with_rng(timeout: Duration, mut rng: StdRng) -> Self {
        let next_id = rng.gen();
        Self {
            next_id,
            timeout,
            rng,
            pending: Vec::new(),
        }
    }

    pub fn request(&mut self, now: Instant) -> u32 {
        self.request_with(now, self.timeout, false)
    }

    /// Issues a request. With `force_timeout` the reply is scheduled one
    /// second after the timeout so the request always times out.
    pub fn request_with(&mut self, now: Instant, timeout: Duration, force_timeout: bool) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let timeout_ms = timeout.as_millis();
        let reply_ms = if force_timeout {
            timeout_ms + FORCED_TIMEOUT_EXTRA_MS
        } else {
            let low = timeout_ms / 4;
            let high = timeout_ms + timeout_ms / 8;
            if high > low {
                self.rng.gen_range(low..high)
            } else {
                low
            }
        };

        debug!(
            "📖 Recipe request #{}: reply in {}ms, timeout in {}ms",
            id, reply_ms, timeout_ms
        );
        self.pending.push(PendingRequest {
            id,
            reply_at: now + Duration::from_millis(reply_ms),
            timeout_at: now + timeout,
        });
        id
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(PendingRequest::deadline).min()
    }

    /// Retires every request whose first deadline is at or before `now`,
    /// oldest deadline first.
    pub fn poll(&mut self, now: Instant) -> Vec<CatalogResponse> {
        let mut due: Vec<PendingRequest> = Vec::new();
        self.pending.retain(|request| {
            if request.deadline() <= now {
                due.push(*request);
                false
            } else {
                true
            }
        });
        due.sort_by_key(PendingRequest::deadline);

        due.into_iter()
            .map(|request| {
                let json = if request.replied() {
                    info!("📖 Recipe request #{} answered", request.id);
                    RECIPES_JSON
                } else {
                    info!("📖 Recipe request #{} timed out", request.id);
                    TIMEOUT_REPLY
                };
                CatalogResponse {
                    request_id: request.id,
                    json: json.to_string(),
                }
            })
            .collect()
    }
}
