use gateway_client::{Fields, SeriesDataPoint};
use rand::Rng;

/// Random reading for the given fields, with occasional outliers.
pub fn generate_reading(rng: &mut impl Rng, fields: &[String]) -> Fields {
    fields
        .iter()
        .map(|field| (field.clone(), generate_value(rng, field)))
        .collect()
}

fn generate_value(rng: &mut impl Rng, field: &str) -> f64 {
    let value = match field {
        "temperature" => {
            if rng.gen_bool(0.05) {
                rng.gen_range(-50.0..100.0) // 5% outliers
            } else {
                rng.gen_range(15.0..35.0)
            }
        }
        "humidity" => {
            if rng.gen_bool(0.05) {
                rng.gen_range(0.0..100.0) // 5% outliers
            } else {
                rng.gen_range(30.0..80.0)
            }
        }
        "battery" => {
            if rng.gen_bool(0.02) {
                rng.gen_range(0.0..20.0) // 2% low battery
            } else {
                rng.gen_range(20.0..100.0)
            }
        }
        _ => rng.gen_range(0.0..100.0),
    };

    (value * 100.0_f64).round() / 100.0
}

/// What a chart of the series would show at a glance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub last: f64,
}

impl SeriesSummary {
    pub fn of(points: &[SeriesDataPoint]) -> Option<Self> {
        let last = points.last()?.value;
        let (min, max, sum) = points.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), p| (min.min(p.value), max.max(p.value), sum + p.value),
        );

        Some(Self {
            count: points.len(),
            min,
            max,
            mean: sum / points.len() as f64,
            last,
        })
    }
}
