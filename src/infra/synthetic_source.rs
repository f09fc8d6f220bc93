//! Seeded generator of listings scraped from several portals, each with its
//! own column naming, units and noise.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::app::ports::SourcePort;
use crate::domain::{Dataset, Row, Value};
use crate::error::Result;

struct City {
    name: &'static str,
    region: &'static str,
    postal_code: &'static str,
    lat: f64,
    lon: f64,
    price_per_m2: f64,
}

const CITIES: [City; 10] = [
    City { name: "Genève", region: "geneve", postal_code: "1201", lat: 46.2044, lon: 6.1432, price_per_m2: 14500.0 },
    City { name: "Lausanne", region: "vaud", postal_code: "1003", lat: 46.5197, lon: 6.6323, price_per_m2: 11500.0 },
    City { name: "Zurich", region: "zurich", postal_code: "8001", lat: 47.3769, lon: 8.5417, price_per_m2: 15500.0 },
    City { name: "Neuchâtel", region: "neuchatel", postal_code: "2000", lat: 46.9900, lon: 6.9293, price_per_m2: 6800.0 },
    City { name: "Fribourg", region: "fribourg", postal_code: "1700", lat: 46.8065, lon: 7.1619, price_per_m2: 7200.0 },
    City { name: "Berne", region: "berne", postal_code: "3011", lat: 46.9480, lon: 7.4474, price_per_m2: 9500.0 },
    City { name: "Sion", region: "valais", postal_code: "1950", lat: 46.2331, lon: 7.3606, price_per_m2: 6500.0 },
    City { name: "Lugano", region: "tessin", postal_code: "6900", lat: 46.0037, lon: 8.9511, price_per_m2: 9800.0 },
    City { name: "Delémont", region: "jura", postal_code: "2800", lat: 47.3649, lon: 7.3445, price_per_m2: 5200.0 },
    City { name: "Montreux", region: "vaud", postal_code: "1820", lat: 46.4312, lon: 6.9107, price_per_m2: 10800.0 },
];

const PROPERTY_TYPES: [&str; 6] = ["apartment", "house", "villa", "studio", "loft", "duplex"];
const HEATING: [&str; 4] = ["gas", "heat pump", "oil", "district"];
const ENERGY: [&str; 7] = ["A", "B", "C", "D", "E", "F", "G"];
const AGENCIES: [&str; 5] = ["Naef", "Barnes", "Comptoir Immobilier", "Cardis", "Régie du Rhône"];
const PLACEHOLDERS: [&str; 4] = ["n/a", "-", "NULL", "  "];
const SQFT_PER_M2: f64 = 10.7639;

/// The three portal dialects
#[derive(Debug, Clone, Copy)]
enum Portal {
    French,
    English,
    Imperial,
}

pub struct SyntheticSource {
    rows: usize,
    seed: u64,
}

impl SyntheticSource {
    pub fn new(rows: usize, seed: u64) -> Self {
        Self { rows, seed }
    }
}

fn put(row: &mut Row, key: &str, value: impl Into<Value>) {
    row.insert(key.to_string(), value.into());
}

/// Generate `rows` listings. The same seed yields the same dataset.
pub fn generate(rows: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let base_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN);
    let mut listings: Vec<Row> = Vec::with_capacity(rows);

    for i in 0..rows {
        let portal = match i % 3 {
            0 => Portal::French,
            1 => Portal::English,
            _ => Portal::Imperial,
        };
        let city = &CITIES[rng.gen_range(0..CITIES.len())];
        let property_type = *PROPERTY_TYPES.choose(&mut rng).unwrap_or(&"apartment");
        let surface: f64 = (rng.gen_range(28.0..240.0_f64) * 2.0).round() / 2.0;
        let rooms = (1.0 + surface / 28.0).floor().min(12.0);
        let bedrooms = (rooms - 1.0).max(0.0) as i64;
        let price = ((surface * city.price_per_m2 * rng.gen_range(0.85..1.15)) / 1000.0).round() * 1000.0;
        let year: i64 = rng.gen_range(1890..2024);
        let published = base_date + Duration::days(rng.gen_range(0..270));
        let lat = city.lat + rng.gen_range(-0.03..0.03);
        let lon = city.lon + rng.gen_range(-0.03..0.03);
        let title = format!("{} {} pièces à {}", property_type, rooms, city.name);
        let description = format!("{} de {} m² proche du centre", property_type, surface);

        let mut row = Row::new();
        match portal {
            Portal::French => {
                put(&mut row, "annonce_id", format!("FR-{:05}", i));
                put(&mut row, "prix", format!("{} CHF", price as i64));
                put(&mut row, "surface_m2", surface);
                put(&mut row, "lat", lat);
                put(&mut row, "lng", lon);
                put(&mut row, "pieces", rooms);
                put(&mut row, "chambres", bedrooms);
                put(&mut row, "ville", city.name);
                put(&mut row, "code_postal", city.postal_code);
                put(&mut row, "canton", city.region);
                put(&mut row, "type_bien", property_type);
                put(&mut row, "annee_construction", year);
                put(&mut row, "etage", rng.gen_range(0..8_i64));
                put(&mut row, "date_publication", published.format("%d/%m/%Y").to_string());
                put(&mut row, "titre", title);
                put(&mut row, "description", description);
                put(&mut row, "agence", *AGENCIES.choose(&mut rng).unwrap_or(&"Naef"));
                put(&mut row, "classe_energie", *ENERGY.choose(&mut rng).unwrap_or(&"C"));
                put(&mut row, "chauffage", *HEATING.choose(&mut rng).unwrap_or(&"gas"));
            }
            Portal::English => {
                put(&mut row, "listing_id", format!("EN-{:05}", i));
                put(&mut row, "price", price);
                put(&mut row, "living_area_m2", surface);
                put(&mut row, "latitude", lat);
                put(&mut row, "longitude", lon);
                put(&mut row, "rooms", rooms);
                put(&mut row, "bedrooms", bedrooms);
                put(&mut row, "bathrooms", (bedrooms / 2 + 1).max(1));
                put(&mut row, "city", city.name);
                put(&mut row, "postal_code", city.postal_code);
                put(&mut row, "region", city.region);
                put(&mut row, "property_type", property_type);
                put(&mut row, "year_built", year);
                put(&mut row, "parking_spaces", rng.gen_range(0..3_i64));
                put(&mut row, "published_at", published.format("%Y-%m-%d").to_string());
                put(&mut row, "title", title);
                put(&mut row, "desc", description);
                put(&mut row, "broker", *AGENCIES.choose(&mut rng).unwrap_or(&"Naef"));
                put(&mut row, "energy_class", *ENERGY.choose(&mut rng).unwrap_or(&"C"));
                put(&mut row, "heating", *HEATING.choose(&mut rng).unwrap_or(&"gas"));
            }
            Portal::Imperial => {
                put(&mut row, "reference", format!("US-{:05}", i));
                put(&mut row, "asking_price", price);
                put(&mut row, "area_sqft", (surface * SQFT_PER_M2).round());
                put(&mut row, "geo_lat", lat);
                put(&mut row, "geo_lon", lon);
                put(&mut row, "nb_rooms", rooms);
                put(&mut row, "nb_bedroom", bedrooms);
                put(&mut row, "locality", city.name);
                put(&mut row, "zip", city.postal_code);
                put(&mut row, "state", city.region);
                put(&mut row, "category", property_type);
                put(&mut row, "construction_year", year);
                put(&mut row, "listing_date", published.format("%Y-%m-%d").to_string());
                put(
                    &mut row,
                    "updated_at",
                    (published + Duration::days(rng.gen_range(0..30))).format("%Y-%m-%d").to_string(),
                );
                put(&mut row, "headline", title);
                put(&mut row, "agency", *AGENCIES.choose(&mut rng).unwrap_or(&"Naef"));
            }
        }

        // Noise shared by every portal
        put(&mut row, "scraped_by", "crawler-v2");
        if rng.gen_bool(0.03) {
            put(&mut row, "internal_notes", "check photos");
        }
        if rng.gen_bool(0.05) {
            let victim = match portal {
                Portal::French => "ville",
                Portal::English => "city",
                Portal::Imperial => "locality",
            };
            put(&mut row, victim, *PLACEHOLDERS.choose(&mut rng).unwrap_or(&"n/a"));
        }
        if rng.gen_bool(0.01) {
            let key = match portal {
                Portal::French => "prix",
                Portal::English => "price",
                Portal::Imperial => "asking_price",
            };
            put(&mut row, key, 990_000_000.0);
        }

        let duplicate = rng.gen_bool(0.02);
        listings.push(row.clone());
        if duplicate {
            listings.push(row);
        }
    }

    Dataset::from_rows(listings)
}

#[async_trait]
impl SourcePort for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn extract(&self) -> Result<Dataset> {
        let dataset = generate(self.rows, self.seed);
        info!(
            "🎲 Generated {} synthetic listings × {} columns (seed {})",
            dataset.row_count(),
            dataset.column_count(),
            self.seed
        );
        Ok(dataset)
    }
}
